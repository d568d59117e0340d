//! In-memory vhci controller shared by the integration tests

#![allow(dead_code)]

use client::virtual_usb::{BindError, HubSpeed, PortEntry, PortStatus, Vhci, VhciHandle};
use protocol::DeviceSpeed;
use std::collections::HashSet;
use std::io;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct State {
    pub ports: Vec<PortEntry>,
    /// Total `open` calls
    pub opens: usize,
    /// Handles currently alive
    pub open_handles: usize,
    /// Ports a competing actor grabs right before our bind
    pub contended: HashSet<u16>,
    pub always_busy: bool,
    /// Reject every bind with a non-busy error
    pub fail_attach: bool,
    /// (port, devid, speed) of every bind attempt
    pub binds: Vec<(u16, u32, DeviceSpeed)>,
}

/// Controller with `hs` ports `0..hs` followed by `ss` ports `hs..hs+ss`
#[derive(Debug, Clone, Default)]
pub struct MockVhci {
    state: Arc<Mutex<State>>,
}

impl MockVhci {
    pub fn new(hs: u16, ss: u16) -> Self {
        let mut ports: Vec<PortEntry> = (0..hs)
            .map(|p| PortEntry::unassigned(HubSpeed::High, p))
            .collect();
        ports.extend((hs..hs + ss).map(|p| PortEntry::unassigned(HubSpeed::Super, p)));

        Self {
            state: Arc::new(Mutex::new(State {
                ports,
                ..Default::default()
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_status(&self, port: u16, status: PortStatus) {
        let mut state = self.state();
        if let Some(entry) = state.ports.iter_mut().find(|e| e.port == port) {
            entry.status = status;
        }
    }

    pub fn status(&self, port: u16) -> Option<PortStatus> {
        self.state()
            .ports
            .iter()
            .find(|e| e.port == port)
            .map(|e| e.status)
    }
}

pub struct MockHandle {
    state: Arc<Mutex<State>>,
    ports: Vec<PortEntry>,
}

impl Vhci for MockVhci {
    type Handle = MockHandle;

    fn open(&self) -> client::Result<MockHandle> {
        let mut state = self.state();
        state.opens += 1;
        state.open_handles += 1;
        Ok(MockHandle {
            state: self.state.clone(),
            ports: state.ports.clone(),
        })
    }
}

impl VhciHandle for MockHandle {
    fn ports(&self) -> &[PortEntry] {
        &self.ports
    }

    fn refresh(&mut self) -> client::Result<()> {
        self.ports = self.state.lock().unwrap().ports.clone();
        Ok(())
    }

    fn attach(
        &mut self,
        port: u16,
        _sockfd: RawFd,
        devid: u32,
        speed: DeviceSpeed,
    ) -> Result<(), BindError> {
        let mut state = self.state.lock().unwrap();
        state.binds.push((port, devid, speed));

        if state.always_busy {
            return Err(BindError::Busy);
        }
        if state.fail_attach {
            return Err(BindError::Failed(io::Error::from_raw_os_error(22)));
        }

        let contended = state.contended.remove(&port);
        let Some(entry) = state.ports.iter_mut().find(|e| e.port == port) else {
            return Err(BindError::Failed(io::ErrorKind::NotFound.into()));
        };
        if contended || entry.status != PortStatus::Null {
            entry.status = PortStatus::Used;
            return Err(BindError::Busy);
        }

        entry.status = PortStatus::Used;
        entry.devid = devid;
        entry.speed = speed.code();
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open_handles -= 1;
        }
    }
}
