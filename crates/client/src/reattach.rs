//! Reattach a vhci port from its connection record
//!
//! Used after the connection behind a port dropped (exporter restart,
//! network loss): the port is free again but its record still names the
//! remote endpoint and bus id. A port that is still attached is left alone.

use crate::attach::{AttachContext, attach_device};
use crate::error::{Error, Result};
use crate::virtual_usb::{Vhci, VhciHandle};
use tracing::info;

/// Successful reattach outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReattachOutcome {
    /// Port was still attached; nothing was done
    AlreadyAttached { port: u16 },
    /// Record for `port` was replayed; the device now sits on `attached_port`
    Reattached { port: u16, attached_port: u16 },
}

/// Parse a port argument: decimal digits only, within range
pub fn parse_port(arg: &str) -> Result<u16> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidPort(arg.to_string()));
    }
    arg.parse::<u16>()
        .map_err(|_| Error::InvalidPort(format!("{} (out of range)", arg)))
}

/// Reattach the device last recorded for `port_arg`
///
/// The argument is validated before the controller is touched. The
/// controller handle is only held while the port table is inspected.
pub async fn reattach_port<V: Vhci>(ctx: &AttachContext<V>, port_arg: &str) -> Result<ReattachOutcome> {
    let port = parse_port(port_arg)?;

    {
        let handle = ctx.vhci.open()?;
        let ports = handle.ports();

        let Some(index) = ports.iter().position(|entry| entry.port == port) else {
            return Err(Error::InvalidPort(format!(
                "{} > maxports {}",
                port_arg,
                ports.len()
            )));
        };

        if !ports[index].status.is_free() {
            info!("Port {} is already attached!", port);
            return Ok(ReattachOutcome::AlreadyAttached { port });
        }
    }

    let record = ctx.recorder.read_record(port)?;
    let attached_port = attach_device(ctx, &record.host, &record.service, &record.busid).await?;

    info!("Port {} is now (re)attached!", port);
    Ok(ReattachOutcome::Reattached {
        port,
        attached_port,
    })
}
