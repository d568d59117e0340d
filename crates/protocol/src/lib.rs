//! USB/IP wire protocol
//!
//! This crate defines the fixed binary layout of the messages a USB/IP
//! client exchanges with a remote exporter before handing the connection
//! to the kernel's virtual host controller. All integers are big-endian.
//!
//! # Example
//!
//! ```
//! use protocol::{BusId, ImportRequest, OpCode, OpCommon};
//! use protocol::{decode, encode};
//!
//! let header = OpCommon::request(OpCode::ReqImport);
//! let request = ImportRequest { busid: BusId::new("1-2") };
//!
//! let mut bytes = encode(&header).unwrap();
//! bytes.extend(encode(&request).unwrap());
//! assert_eq!(bytes.len(), 8 + 32);
//!
//! let decoded: OpCommon = decode(&bytes).unwrap();
//! assert_eq!(decoded.code, OpCode::ReqImport as u16);
//! ```

pub mod codec;
pub mod device;
pub mod error;
pub mod op;
pub mod version;

pub use codec::{WireFormat, decode, encode};

#[cfg(feature = "async")]
pub use codec::{read_async, write_async};
pub use device::{BusId, DeviceSpeed, SYSFS_BUS_ID_SIZE, SYSFS_PATH_MAX, UsbDevice};
pub use error::{ProtocolError, Result};
pub use op::{ImportRequest, OpCode, OpCommon, OpStatus};
pub use version::{CURRENT_VERSION, ProtocolVersion};

/// Well-known TCP port of the USB/IP exporter
pub const USBIP_PORT: u16 = 3240;
