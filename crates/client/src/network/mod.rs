//! Network subsystem
//!
//! TCP transport to the remote exporter and the import exchange run over it.

pub mod import;
pub mod transport;

// Re-export public types
pub use import::query_import;
pub use transport::{USBIP_SERVICE_NAME, connect, resolve_service};
