//! Attach orchestration
//!
//! A fresh attach runs four stages in order, stopping at the first failure:
//!
//! 1. connect to the exporter ([`crate::network::connect`])
//! 2. import the device ([`crate::network::query_import`])
//! 3. bind the connection to a free vhci port ([`import_device`])
//! 4. record the session ([`ConnectionRecorder::record_connection`])
//!
//! Nothing is rolled back: if stage 4 fails the port stays attached but
//! unrecorded, so a later `reattach` of that port will not find a record.

use crate::config::DEFAULT_MAX_BUSY_RETRIES;
use crate::error::{Error, Result};
use crate::network::{connect, query_import};
use crate::record::ConnectionRecorder;
use crate::virtual_usb::{BindError, Vhci, VhciHandle};
use protocol::UsbDevice;
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, error, info};

/// Everything an attach or reattach needs, passed explicitly to each routine
#[derive(Debug, Clone)]
pub struct AttachContext<V> {
    pub vhci: V,
    pub recorder: ConnectionRecorder,
    /// Busy binds tolerated before reporting "no free port"
    pub max_busy_retries: u32,
}

impl<V: Vhci> AttachContext<V> {
    pub fn new(vhci: V, recorder: ConnectionRecorder) -> Self {
        Self {
            vhci,
            recorder,
            max_busy_retries: DEFAULT_MAX_BUSY_RETRIES,
        }
    }

    pub fn with_max_busy_retries(mut self, max_busy_retries: u32) -> Self {
        self.max_busy_retries = max_busy_retries;
        self
    }
}

/// Bind an imported device's connection to a free vhci port
///
/// A busy bind means another actor took the port between lookup and bind;
/// the lookup is repeated up to `max_busy_retries` times. Any other bind
/// failure is fatal. The controller handle is released on every return.
pub fn import_device<V: Vhci>(
    ctx: &AttachContext<V>,
    sockfd: RawFd,
    device: &UsbDevice,
) -> Result<u16> {
    let mut handle = ctx.vhci.open()?;
    let mut busy = 0;

    loop {
        let port = handle
            .free_port(device.speed)?
            .ok_or(Error::NoFreePort {
                speed: device.speed,
            })?;

        debug!("Got free port {}", port);

        match handle.attach(port, sockfd, device.devid(), device.speed) {
            Ok(()) => return Ok(port),
            Err(BindError::Busy) => {
                busy += 1;
                if busy > ctx.max_busy_retries {
                    debug!("Port {} busy, giving up after {} retries", port, busy - 1);
                    return Err(Error::NoFreePort {
                        speed: device.speed,
                    });
                }
                debug!("Port {} busy, retrying ({}/{})", port, busy, ctx.max_busy_retries);
            }
            Err(BindError::Failed(source)) => return Err(Error::Attach { port, source }),
        }
    }
}

/// Attach `busid` from `host:service` and record the session
///
/// Returns the vhci port the device now occupies.
pub async fn attach_device<V: Vhci>(
    ctx: &AttachContext<V>,
    host: &str,
    service: &str,
    busid: &str,
) -> Result<u16> {
    let mut stream = connect(host, service).await?;
    let device = query_import(&mut stream, busid).await?;
    let port = import_device(ctx, stream.as_raw_fd(), &device)?;

    // vhci_hcd holds its own reference to the socket now
    drop(stream);

    if let Err(e) = ctx.recorder.record_connection(host, service, busid, port) {
        error!("Port {} is attached but its connection was not recorded", port);
        return Err(e);
    }

    info!("Attached {} from {}:{} to port {}", busid, host, service, port);
    Ok(port)
}
