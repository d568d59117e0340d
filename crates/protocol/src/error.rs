//! Protocol error types

use crate::op::OpStatus;
use crate::version::ProtocolVersion;
use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Peer speaks a different USB/IP version
    #[error("USB/IP version mismatch: peer speaks {remote}, expected {expected}")]
    VersionMismatch {
        remote: ProtocolVersion,
        expected: ProtocolVersion,
    },

    /// Reply carried an operation code other than the one we waited for
    #[error("Unexpected operation code {actual:#06x} (expected {expected:#06x})")]
    UnexpectedOpCode { expected: u16, actual: u16 },

    /// Peer rejected the request
    #[error("Request failed with remote status {code}: {}", OpStatus::describe(*code))]
    RemoteStatus { code: u32 },

    /// Import reply echoed a different bus id than the one requested
    #[error("Bus id mismatch: requested {requested:?}, peer replied {received:?}")]
    BusIdMismatch { requested: String, received: String },

    /// Speed code outside the known USB speed range
    #[error("Unknown device speed code {0}")]
    UnknownSpeed(u32),

    /// Buffer too small for operation
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// I/O error during the exchange (including a peer hanging up mid-reply)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
