//! TCP transport to the remote exporter
//!
//! Resolves the host, tries every resolved address in order, and returns
//! the first connected stream. No retry beyond that.

use crate::error::{Error, Result};
use std::io;
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, warn};

/// Service name accepted in place of the numeric exporter port
pub const USBIP_SERVICE_NAME: &str = "usbip";

/// Map a service string (decimal port or `usbip`) to a TCP port
pub fn resolve_service(service: &str) -> io::Result<u16> {
    if service == USBIP_SERVICE_NAME {
        return Ok(protocol::USBIP_PORT);
    }
    service.parse::<u16>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown service '{}'", service),
        )
    })
}

/// Open a TCP stream to `host:service`
pub async fn connect(host: &str, service: &str) -> Result<TcpStream> {
    let connect_error = |source: io::Error| Error::Connect {
        host: host.to_string(),
        service: service.to_string(),
        source,
    };

    let port = resolve_service(service).map_err(connect_error)?;
    let addrs = lookup_host((host, port)).await.map_err(connect_error)?;

    let mut last_error = None;
    for addr in addrs {
        debug!("Connecting to {}", addr);
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                configure_socket(&stream);
                debug!("Connected to {}", addr);
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(connect_error(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    })))
}

/// Best-effort socket options; failures are logged, not fatal
fn configure_socket(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    #[cfg(target_os = "linux")]
    {
        use nix::sys::socket::{setsockopt, sockopt};
        if let Err(e) = setsockopt(stream, sockopt::KeepAlive, &true) {
            warn!("Failed to set SO_KEEPALIVE: {}", e);
        }
    }
}
