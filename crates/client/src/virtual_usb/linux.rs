//! Linux vhci_hcd driver over sysfs
//!
//! vhci_hcd registers one platform device per controller
//! (`/sys/devices/platform/vhci_hcd.N`). All control attributes live on the
//! first one:
//!
//! - `nports` - total number of ports across all controllers
//! - `status`, `status.1`, ... - port table of controller 0, 1, ...
//! - `attach` - bind a connection: `<port> <sockfd> <devid> <speed>`
//!
//! ## Status Format
//!
//! ```text
//! hub port sta spd dev      sockfd local_busid
//! hs  0000 004 000 00000000 000000 0-0
//! ss  0008 006 005 00010003 000003 2-1
//! ```
//!
//! Writing to `attach` fails with `EBUSY` when the port was claimed
//! between the status read and the write.

use super::{BindError, HubSpeed, PortEntry, PortStatus, Vhci, VhciHandle};
use crate::error::{Error, Result};
use nix::errno::Errno;
use protocol::DeviceSpeed;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name prefix of vhci_hcd platform devices
const VHCI_DEVICE_PREFIX: &str = "vhci_hcd.";

/// vhci_hcd reached through sysfs
#[derive(Debug, Clone)]
pub struct SysfsVhci {
    /// Directory containing the `vhci_hcd.N` devices
    platform_root: PathBuf,
}

impl SysfsVhci {
    pub fn new(platform_root: impl Into<PathBuf>) -> Self {
        Self {
            platform_root: platform_root.into(),
        }
    }

    /// Path of the first controller, which carries every attribute
    fn controller_path(&self) -> PathBuf {
        self.platform_root.join(format!("{}0", VHCI_DEVICE_PREFIX))
    }

    fn count_controllers(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.platform_root).map_err(|e| {
            Error::Driver(format!(
                "Failed to list {}: {}",
                self.platform_root.display(),
                e
            ))
        })?;

        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(VHCI_DEVICE_PREFIX))
            })
            .count())
    }
}

impl Vhci for SysfsVhci {
    type Handle = SysfsHandle;

    fn open(&self) -> Result<SysfsHandle> {
        let hc_path = self.controller_path();
        if !hc_path.is_dir() {
            return Err(Error::Driver(format!(
                "{} not found. Please load the kernel module: sudo modprobe vhci-hcd",
                hc_path.display()
            )));
        }

        let nports = read_attribute(&hc_path, "nports")?
            .trim()
            .parse::<usize>()
            .map_err(|e| Error::Driver(format!("Invalid nports attribute: {}", e)))?;
        let num_controllers = self.count_controllers()?.max(1);

        let mut handle = SysfsHandle {
            hc_path,
            nports,
            num_controllers,
            ports: Vec::with_capacity(nports),
        };
        handle.refresh()?;

        debug!(
            "Opened vhci_hcd at {}: {} controllers, {} ports",
            handle.hc_path.display(),
            num_controllers,
            nports
        );

        Ok(handle)
    }
}

/// Open vhci_hcd handle holding an owned port table snapshot
#[derive(Debug)]
pub struct SysfsHandle {
    hc_path: PathBuf,
    nports: usize,
    num_controllers: usize,
    ports: Vec<PortEntry>,
}

impl SysfsHandle {
    pub fn nports(&self) -> usize {
        self.nports
    }
}

impl VhciHandle for SysfsHandle {
    fn ports(&self) -> &[PortEntry] {
        &self.ports
    }

    fn refresh(&mut self) -> Result<()> {
        let mut ports = Vec::with_capacity(self.nports);
        for controller in 0..self.num_controllers {
            let text = read_attribute(&self.hc_path, &status_attribute(controller))?;
            ports.extend(parse_status(&text)?);
        }

        if ports.len() != self.nports {
            debug!(
                "Status lists {} ports but nports is {}",
                ports.len(),
                self.nports
            );
        }

        self.ports = ports;
        Ok(())
    }

    fn attach(
        &mut self,
        port: u16,
        sockfd: RawFd,
        devid: u32,
        speed: DeviceSpeed,
    ) -> std::result::Result<(), BindError> {
        let attach_path = self.hc_path.join("attach");
        let attach_string = format!("{} {} {} {}", port, sockfd, devid, speed.code());

        debug!("Writing to {}: {}", attach_path.display(), attach_string);

        let mut file = OpenOptions::new()
            .write(true)
            .open(&attach_path)
            .map_err(BindError::Failed)?;

        file.write_all(attach_string.as_bytes())
            .map_err(classify_bind_error)
    }
}

impl Drop for SysfsHandle {
    fn drop(&mut self) {
        debug!("Closed vhci_hcd at {}", self.hc_path.display());
    }
}

fn classify_bind_error(error: std::io::Error) -> BindError {
    if error.raw_os_error() == Some(Errno::EBUSY as i32) {
        BindError::Busy
    } else {
        BindError::Failed(error)
    }
}

/// Attribute holding the port table of controller `index`
fn status_attribute(index: usize) -> String {
    if index == 0 {
        "status".to_string()
    } else {
        format!("status.{}", index)
    }
}

fn read_attribute(hc_path: &Path, name: &str) -> Result<String> {
    let path = hc_path.join(name);
    fs::read_to_string(&path)
        .map_err(|e| Error::Driver(format!("Failed to read {}: {}", path.display(), e)))
}

/// Parse one status attribute (header line followed by one line per port)
pub fn parse_status(text: &str) -> Result<Vec<PortEntry>> {
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(parse_status_line)
        .collect()
}

fn parse_status_line(line: &str) -> Result<PortEntry> {
    let malformed = || Error::Driver(format!("Malformed status line: '{}'", line));

    let fields: Vec<&str> = line.split_whitespace().collect();
    let &[hub, port, status, speed, devid, sockfd, local_busid] = fields.as_slice() else {
        return Err(malformed());
    };

    Ok(PortEntry {
        hub: HubSpeed::from_label(hub).ok_or_else(malformed)?,
        port: port.parse().map_err(|_| malformed())?,
        status: status
            .parse()
            .ok()
            .and_then(PortStatus::from_code)
            .ok_or_else(malformed)?,
        speed: speed.parse().map_err(|_| malformed())?,
        devid: u32::from_str_radix(devid, 16).map_err(|_| malformed())?,
        sockfd: sockfd.parse().map_err(|_| malformed())?,
        local_busid: local_busid.to_string(),
    })
}
