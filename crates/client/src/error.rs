//! Attach/reattach error types
//!
//! Each variant corresponds to one failure kind a caller may want to tell
//! apart; the first failure encountered is returned unchanged.

use protocol::{DeviceSpeed, ProtocolError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Host/service resolution or TCP connect failed
    #[error("Failed to connect to {host}:{service}: {source}")]
    Connect {
        host: String,
        service: String,
        #[source]
        source: std::io::Error,
    },

    /// Import negotiation failed (remote status, bus id mismatch, I/O)
    #[error("Import negotiation failed: {0}")]
    Protocol(#[from] ProtocolError),

    /// No vhci port of the required hub speed is free
    #[error("No free port for {speed} device")]
    NoFreePort { speed: DeviceSpeed },

    /// vhci_hcd rejected the bind for a reason other than contention
    #[error("Failed to attach device to port {port}: {source}")]
    Attach {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Writing the connection record failed
    #[error("Failed to record connection at {}: {source}", path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No usable connection record for the port
    #[error("No connection record for port {port}: {reason}")]
    RecordNotFound { port: u16, reason: String },

    /// Malformed or out-of-range port argument
    #[error("Invalid port {0}")]
    InvalidPort(String),

    /// vhci_hcd is missing or its sysfs attributes are unreadable
    #[error("vhci_hcd driver error: {0}")]
    Driver(String),
}

pub type Result<T> = std::result::Result<T, Error>;
