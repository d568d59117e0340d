//! Operation messages exchanged before a device is handed to vhci_hcd
//!
//! Every operation starts with an 8-byte common header:
//!
//! ```text
//! [version: u16][code: u16][status: u32]
//! ```
//!
//! Requests have the high byte of `code` set to `0x80`, replies to `0x00`.

use crate::codec::WireFormat;
use crate::device::BusId;
use crate::error::{ProtocolError, Result};
use crate::version::{CURRENT_VERSION, ProtocolVersion};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Operation codes used by the import exchange
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Client asks the exporter to hand over a device
    ReqImport = 0x8003,
    /// Exporter's answer to [`OpCode::ReqImport`]
    RepImport = 0x0003,
}

impl OpCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x8003 => Some(Self::ReqImport),
            0x0003 => Some(Self::RepImport),
            _ => None,
        }
    }
}

/// Status carried in the common header
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Ok = 0,
    NotAvailable = 1,
    DeviceBusy = 2,
    DeviceError = 3,
    NoDevice = 4,
    Error = 5,
}

impl OpStatus {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::NotAvailable),
            2 => Some(Self::DeviceBusy),
            3 => Some(Self::DeviceError),
            4 => Some(Self::NoDevice),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "Request Completed Successfully",
            Self::NotAvailable => "Request not available",
            Self::DeviceBusy => "Device busy (exported)",
            Self::DeviceError => "Device in error state",
            Self::NoDevice => "Device not found",
            Self::Error => "Unexpected response",
        }
    }

    /// Human-readable text for a raw status code
    pub fn describe(code: u32) -> &'static str {
        Self::from_code(code)
            .map(Self::description)
            .unwrap_or("Unknown status")
    }
}

/// Common header preceding every operation payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCommon {
    pub version: u16,
    pub code: u16,
    pub status: u32,
}

impl OpCommon {
    /// Header for an outgoing request (status is always zero)
    pub fn request(code: OpCode) -> Self {
        Self {
            version: CURRENT_VERSION.to_wire(),
            code: code as u16,
            status: OpStatus::Ok as u32,
        }
    }

    /// Header for a reply carrying `status`
    pub fn reply(code: OpCode, status: OpStatus) -> Self {
        Self {
            version: CURRENT_VERSION.to_wire(),
            code: code as u16,
            status: status as u32,
        }
    }

    /// Check a received header against the reply we are waiting for
    ///
    /// Version is checked first, then the operation code, then the status.
    pub fn expect_reply(&self, expected: OpCode) -> Result<()> {
        let remote = ProtocolVersion::from_wire(self.version);
        if !CURRENT_VERSION.is_compatible_with(&remote) {
            return Err(ProtocolError::VersionMismatch {
                remote,
                expected: CURRENT_VERSION,
            });
        }

        if self.code != expected as u16 {
            return Err(ProtocolError::UnexpectedOpCode {
                expected: expected as u16,
                actual: self.code,
            });
        }

        if self.status != OpStatus::Ok as u32 {
            return Err(ProtocolError::RemoteStatus { code: self.status });
        }

        Ok(())
    }
}

impl WireFormat for OpCommon {
    const SIZE: usize = 8;

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            version: reader.read_u16::<BigEndian>()?,
            code: reader.read_u16::<BigEndian>()?,
            status: reader.read_u32::<BigEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(self.version)?;
        writer.write_u16::<BigEndian>(self.code)?;
        writer.write_u32::<BigEndian>(self.status)?;
        Ok(())
    }
}

/// Import request payload: the bus id of the wanted device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportRequest {
    pub busid: BusId,
}

impl WireFormat for ImportRequest {
    const SIZE: usize = BusId::SIZE;

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            busid: BusId::read_from(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.busid.as_bytes())?;
        Ok(())
    }
}
