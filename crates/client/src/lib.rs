//! USB/IP client
//!
//! Makes a USB device exported by a remote host appear as a local device:
//! the import exchange runs over TCP, then the connection is bound to a
//! port of the kernel's virtual host controller, and the session is
//! recorded so it can be re-established later with [`reattach_port`].

pub mod attach;
pub mod config;
pub mod error;
pub mod network;
pub mod reattach;
pub mod record;
pub mod virtual_usb;

pub use attach::{AttachContext, attach_device, import_device};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use reattach::{ReattachOutcome, parse_port, reattach_port};
pub use record::{AttachmentRecord, ConnectionRecorder};
pub use virtual_usb::{BindError, HubSpeed, PortEntry, PortStatus, Vhci, VhciHandle};
