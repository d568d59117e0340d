//! Test utilities for the USB/IP client
//!
//! Provides mock device descriptors and a mock remote exporter that answers
//! import requests over a real TCP socket on localhost.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_usb_device;
//! use protocol::DeviceSpeed;
//!
//! let device = create_mock_usb_device("1-2", DeviceSpeed::High);
//! assert_eq!(device.busid.to_string_lossy(), "1-2");
//! ```

use protocol::{
    BusId, DeviceSpeed, ImportRequest, OpCode, OpCommon, OpStatus, UsbDevice, read_async,
    write_async,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock exported device with the given bus id and speed
pub fn create_mock_usb_device(busid: &str, speed: DeviceSpeed) -> UsbDevice {
    UsbDevice {
        path: format!("/sys/devices/platform/dummy_hcd.0/usb1/{}", busid),
        busid: BusId::new(busid),
        busnum: 1,
        devnum: 2,
        speed,
        id_vendor: 0x1234,
        id_product: 0x5678,
        bcd_device: 0x0100,
        device_class: 0x00,
        device_subclass: 0x00,
        device_protocol: 0x00,
        configuration_value: 1,
        num_configurations: 1,
        num_interfaces: 1,
    }
}

/// What the mock exporter sends back after reading an import request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful reply carrying this device
    Device(UsbDevice),
    /// Header only, with a failure status
    Status(OpStatus),
    /// Arbitrary bytes, for malformed replies
    Raw(Vec<u8>),
}

/// Mock USB/IP exporter bound to an ephemeral localhost port
///
/// Every accepted connection reads one import request, records it, sends
/// the configured reply, then drains the socket until the peer closes it.
/// [`MockReply::Raw`] connections are closed right after the bytes go out.
pub struct MockExporter {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<BusId>>>,
    task: JoinHandle<()>,
}

impl MockExporter {
    /// Start serving `reply` on `127.0.0.1:<ephemeral>`
    pub async fn start(reply: MockReply) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let connections = connections.clone();
            let requests = requests.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_import(stream, reply.clone(), requests.clone()));
                }
            }
        });

        Ok(Self {
            addr,
            connections,
            requests,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Number of TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Bus ids received in import requests, in arrival order
    pub fn requested_busids(&self) -> Vec<BusId> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl Drop for MockExporter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_import(mut stream: TcpStream, reply: MockReply, requests: Arc<Mutex<Vec<BusId>>>) {
    let Ok(header) = read_async::<OpCommon, _>(&mut stream).await else {
        return;
    };
    if header.code != OpCode::ReqImport as u16 {
        return;
    }
    let Ok(request) = read_async::<ImportRequest, _>(&mut stream).await else {
        return;
    };
    if let Ok(mut requests) = requests.lock() {
        requests.push(request.busid);
    }

    let sent = match reply {
        MockReply::Device(device) => {
            match write_async(&mut stream, &OpCommon::reply(OpCode::RepImport, OpStatus::Ok)).await
            {
                Ok(()) => write_async(&mut stream, &device).await,
                Err(e) => Err(e),
            }
        }
        MockReply::Status(status) => {
            write_async(&mut stream, &OpCommon::reply(OpCode::RepImport, status)).await
        }
        MockReply::Raw(bytes) => {
            // Close right away so a short reply reads as end of stream
            let _ = stream.write_all(&bytes).await;
            return;
        }
    };
    if sent.is_err() {
        return;
    }

    let mut sink = [0u8; 512];
    while let Ok(n) = stream.read(&mut sink).await {
        if n == 0 {
            break;
        }
    }
}

/// Timeout wrapper for async tests
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
