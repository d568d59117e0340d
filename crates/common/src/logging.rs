//! Logging setup and configuration

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build the filter used by [`setup_logging`]
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies.
pub fn log_filter(default_level: &str) -> crate::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::LogFilter {
            filter: default_level.to_string(),
            reason: e.to_string(),
        })
}

/// Setup tracing subscriber for the application
///
/// Log lines go to stderr so command output on stdout stays clean.
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = log_filter(default_level)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| crate::Error::AlreadyInitialized(e.to_string()))?;

    Ok(())
}
