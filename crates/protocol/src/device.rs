//! Exported device description
//!
//! Layout of `usbip_usb_device` as sent in the import reply (312 bytes):
//!
//! ```text
//! path[256] busid[32] busnum:u32 devnum:u32 speed:u32
//! idVendor:u16 idProduct:u16 bcdDevice:u16
//! bDeviceClass bDeviceSubClass bDeviceProtocol
//! bConfigurationValue bNumConfigurations bNumInterfaces
//! ```

use crate::codec::{WireFormat, field_str, fixed_field};
use crate::error::{ProtocolError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

/// Width of the bus id field on the wire
pub const SYSFS_BUS_ID_SIZE: usize = 32;

/// Width of the sysfs path field on the wire
pub const SYSFS_PATH_MAX: usize = 256;

/// Bus id as it travels on the wire: a NUL-padded 32-byte field
///
/// At most [`BusId::MAX_LEN`] bytes are significant; the last byte is
/// always NUL when built locally. Equality compares the whole field,
/// padding included.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusId([u8; SYSFS_BUS_ID_SIZE]);

impl BusId {
    /// Longest bus id that survives without truncation
    pub const MAX_LEN: usize = SYSFS_BUS_ID_SIZE - 1;

    /// Build from a string, silently truncating to [`BusId::MAX_LEN`] bytes
    pub fn new(busid: &str) -> Self {
        Self(fixed_field(busid))
    }

    /// Whether `busid` fits without truncation
    pub fn fits(busid: &str) -> bool {
        busid.len() <= Self::MAX_LEN
    }

    /// Wrap a raw field received from the wire
    pub fn from_bytes(bytes: [u8; SYSFS_BUS_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SYSFS_BUS_ID_SIZE] {
        &self.0
    }

    /// Significant prefix (up to the first NUL), lossily decoded
    pub fn to_string_lossy(&self) -> String {
        field_str(&self.0)
    }
}

impl fmt::Debug for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BusId({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl WireFormat for BusId {
    const SIZE: usize = SYSFS_BUS_ID_SIZE;

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; SYSFS_BUS_ID_SIZE];
        reader.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }
}

/// USB device speed, using the kernel's `enum usb_device_speed` codes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpeed {
    Unknown = 0,
    /// Low speed - 1.5 Mbps (USB 1.0)
    Low = 1,
    /// Full speed - 12 Mbps (USB 1.1)
    Full = 2,
    /// High speed - 480 Mbps (USB 2.0)
    High = 3,
    /// Wireless USB 2.5
    Wireless = 4,
    /// SuperSpeed - 5 Gbps (USB 3.0)
    Super = 5,
    /// SuperSpeed+ - 10 Gbps (USB 3.1)
    SuperPlus = 6,
}

impl DeviceSpeed {
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Low),
            2 => Ok(Self::Full),
            3 => Ok(Self::High),
            4 => Ok(Self::Wireless),
            5 => Ok(Self::Super),
            6 => Ok(Self::SuperPlus),
            other => Err(ProtocolError::UnknownSpeed(other)),
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// USB 3.x devices need a super-speed root hub port
    pub fn is_super_speed(self) -> bool {
        matches!(self, Self::Super | Self::SuperPlus)
    }
}

impl fmt::Display for DeviceSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown Speed",
            Self::Low => "Low Speed(1.5Mbps)",
            Self::Full => "Full Speed(12Mbps)",
            Self::High => "High Speed(480Mbps)",
            Self::Wireless => "Wireless",
            Self::Super => "Super Speed(5000Mbps)",
            Self::SuperPlus => "Super Speed Plus(10000Mbps)",
        };
        f.write_str(name)
    }
}

/// Device descriptor returned by the exporter in the import reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// Sysfs path of the device on the exporting host
    pub path: String,
    pub busid: BusId,
    pub busnum: u32,
    pub devnum: u32,
    pub speed: DeviceSpeed,
    pub id_vendor: u16,
    pub id_product: u16,
    pub bcd_device: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub configuration_value: u8,
    pub num_configurations: u8,
    pub num_interfaces: u8,
}

impl UsbDevice {
    /// Device id as vhci_hcd expects it: `busnum << 16 | devnum`
    pub fn devid(&self) -> u32 {
        (self.busnum << 16) | (self.devnum & 0xffff)
    }
}

impl WireFormat for UsbDevice {
    const SIZE: usize = SYSFS_PATH_MAX + SYSFS_BUS_ID_SIZE + 24;

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut path = [0u8; SYSFS_PATH_MAX];
        reader.read_exact(&mut path)?;
        let busid = BusId::read_from(reader)?;
        let busnum = reader.read_u32::<BigEndian>()?;
        let devnum = reader.read_u32::<BigEndian>()?;
        let speed = DeviceSpeed::from_code(reader.read_u32::<BigEndian>()?)?;

        Ok(Self {
            path: field_str(&path),
            busid,
            busnum,
            devnum,
            speed,
            id_vendor: reader.read_u16::<BigEndian>()?,
            id_product: reader.read_u16::<BigEndian>()?,
            bcd_device: reader.read_u16::<BigEndian>()?,
            device_class: reader.read_u8()?,
            device_subclass: reader.read_u8()?,
            device_protocol: reader.read_u8()?,
            configuration_value: reader.read_u8()?,
            num_configurations: reader.read_u8()?,
            num_interfaces: reader.read_u8()?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&fixed_field::<SYSFS_PATH_MAX>(&self.path))?;
        self.busid.write_to(writer)?;
        writer.write_u32::<BigEndian>(self.busnum)?;
        writer.write_u32::<BigEndian>(self.devnum)?;
        writer.write_u32::<BigEndian>(self.speed.code())?;
        writer.write_u16::<BigEndian>(self.id_vendor)?;
        writer.write_u16::<BigEndian>(self.id_product)?;
        writer.write_u16::<BigEndian>(self.bcd_device)?;
        writer.write_u8(self.device_class)?;
        writer.write_u8(self.device_subclass)?;
        writer.write_u8(self.device_protocol)?;
        writer.write_u8(self.configuration_value)?;
        writer.write_u8(self.num_configurations)?;
        writer.write_u8(self.num_interfaces)?;
        Ok(())
    }
}
