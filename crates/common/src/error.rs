//! Errors raised while setting up shared infrastructure

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Log level or `RUST_LOG` directive could not be parsed
    #[error("Invalid log filter '{filter}': {reason}")]
    LogFilter { filter: String, reason: String },

    /// A global subscriber was installed earlier in the process
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

pub type Result<T> = std::result::Result<T, Error>;
