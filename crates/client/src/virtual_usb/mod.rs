//! Virtual host controller access
//!
//! A remote device appears locally once its TCP connection is handed to a
//! port of the kernel's virtual host controller (vhci_hcd). This module
//! defines the seam the attach logic talks to:
//!
//! - [`Vhci`] opens a scoped [`VhciHandle`]; dropping the handle releases it.
//! - [`VhciHandle`] exposes an owned snapshot of the port table, finds free
//!   ports, and binds connections to ports.
//!
//! # Platform Support
//!
//! - **Linux**: sysfs driver in [`linux`] (requires `modprobe vhci-hcd`)
//! - Other platforms have no virtual host controller

use crate::error::Result;
use protocol::DeviceSpeed;
use std::fmt;
use std::os::fd::RawFd;

#[cfg(target_os = "linux")]
pub mod linux;

/// Root hub a vhci port belongs to
///
/// vhci_hcd splits its ports between a USB 2.0 hub and a USB 3.x hub; a
/// device must be bound to a port on the hub matching its speed class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubSpeed {
    /// USB 2.0 and below (low, full, high, wireless)
    High,
    /// USB 3.x (super, super-plus)
    Super,
}

impl HubSpeed {
    pub fn for_device(speed: DeviceSpeed) -> Self {
        if speed.is_super_speed() {
            Self::Super
        } else {
            Self::High
        }
    }

    /// Parse the label used in vhci status files
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "hs" => Some(Self::High),
            "ss" => Some(Self::Super),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "hs",
            Self::Super => "ss",
        }
    }
}

impl fmt::Display for HubSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State of a vhci port, using the kernel's `VDEV_ST_*` codes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    /// Unassigned
    Null = 4,
    /// Claimed but not yet configured
    NotAssigned = 5,
    /// Attached
    Used = 6,
    Error = 7,
}

impl PortStatus {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            4 => Some(Self::Null),
            5 => Some(Self::NotAssigned),
            6 => Some(Self::Used),
            7 => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether no device currently occupies the port
    pub fn is_free(self) -> bool {
        matches!(self, Self::Null | Self::NotAssigned)
    }
}

/// One row of the vhci port table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub hub: HubSpeed,
    pub port: u16,
    pub status: PortStatus,
    /// Raw speed code of the attached device (0 when free)
    pub speed: u32,
    pub devid: u32,
    pub sockfd: u32,
    pub local_busid: String,
}

impl PortEntry {
    /// An unassigned port on `hub`
    pub fn unassigned(hub: HubSpeed, port: u16) -> Self {
        Self {
            hub,
            port,
            status: PortStatus::Null,
            speed: 0,
            devid: 0,
            sockfd: 0,
            local_busid: "0-0".to_string(),
        }
    }
}

/// Why a bind request was rejected
#[derive(Debug)]
pub enum BindError {
    /// Another actor claimed the port after it was reported free
    Busy,
    /// Any other rejection
    Failed(std::io::Error),
}

/// Virtual host controller that can be opened for one routine
pub trait Vhci {
    type Handle: VhciHandle;

    /// Acquire a handle; it is released when dropped
    fn open(&self) -> Result<Self::Handle>;
}

/// Open handle to the virtual host controller
pub trait VhciHandle {
    /// Port table as of the last open/refresh
    fn ports(&self) -> &[PortEntry];

    /// Re-read the port table from the controller
    fn refresh(&mut self) -> Result<()>;

    /// Bind the connection `sockfd` for device `devid` to `port`
    fn attach(
        &mut self,
        port: u16,
        sockfd: RawFd,
        devid: u32,
        speed: DeviceSpeed,
    ) -> std::result::Result<(), BindError>;

    /// First unassigned port on the hub matching `speed`, after a refresh
    fn free_port(&mut self, speed: DeviceSpeed) -> Result<Option<u16>> {
        self.refresh()?;
        let hub = HubSpeed::for_device(speed);
        Ok(self
            .ports()
            .iter()
            .find(|entry| entry.hub == hub && entry.status == PortStatus::Null)
            .map(|entry| entry.port))
    }
}
