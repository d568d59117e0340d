//! Attach integration tests
//!
//! Drives `attach_device` against a mock exporter on localhost and an
//! in-memory vhci controller.
//!
//! Run with: `cargo test -p client --test attach_tests`

mod support;

use client::virtual_usb::PortStatus;
use client::{AttachContext, ConnectionRecorder, Error, attach_device};
use common::test_utils::{
    DEFAULT_TEST_TIMEOUT, MockExporter, MockReply, create_mock_usb_device, with_timeout,
};
use protocol::{DeviceSpeed, OpStatus, ProtocolError};
use std::fs;
use support::MockVhci;
use tempfile::TempDir;

struct Fixture {
    vhci: MockVhci,
    ctx: AttachContext<MockVhci>,
    state_dir: TempDir,
}

fn fixture(hs: u16, ss: u16) -> Fixture {
    let vhci = MockVhci::new(hs, ss);
    let state_dir = tempfile::tempdir().unwrap();
    let ctx = AttachContext::new(vhci.clone(), ConnectionRecorder::new(state_dir.path()))
        .with_max_busy_retries(4);
    Fixture {
        vhci,
        ctx,
        state_dir,
    }
}

async fn exporter(reply: MockReply) -> (MockExporter, String) {
    let exporter = MockExporter::start(reply).await.unwrap();
    let service = exporter.port().to_string();
    (exporter, service)
}

#[tokio::test]
async fn test_attach_records_connection() {
    let fx = fixture(4, 4);
    let device = create_mock_usb_device("1-2", DeviceSpeed::High);
    let (exporter, service) = exporter(MockReply::Device(device.clone())).await;

    let port = with_timeout(
        DEFAULT_TEST_TIMEOUT,
        attach_device(&fx.ctx, "127.0.0.1", &service, "1-2"),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(port, 0);
    assert_eq!(exporter.requested_busids().len(), 1);
    assert_eq!(exporter.requested_busids()[0].to_string_lossy(), "1-2");

    let content = fs::read_to_string(fx.state_dir.path().join("port0")).unwrap();
    assert_eq!(content, format!("127.0.0.1 {} 1-2\n", service));

    let state = fx.vhci.state();
    assert_eq!(state.binds, vec![(0, device.devid(), DeviceSpeed::High)]);
    assert_eq!(state.open_handles, 0);
}

#[tokio::test]
async fn test_super_speed_device_uses_ss_port() {
    let fx = fixture(4, 4);
    let device = create_mock_usb_device("2-1", DeviceSpeed::Super);
    let (_exporter, service) = exporter(MockReply::Device(device)).await;

    let port = attach_device(&fx.ctx, "127.0.0.1", &service, "2-1")
        .await
        .unwrap();

    assert_eq!(port, 4);
    assert!(fx.state_dir.path().join("port4").exists());
}

#[tokio::test]
async fn test_busid_mismatch_touches_nothing() {
    let fx = fixture(4, 4);
    let device = create_mock_usb_device("1-3", DeviceSpeed::High);
    let (_exporter, service) = exporter(MockReply::Device(device)).await;

    let result = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2").await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolError::BusIdMismatch { .. }))
    ));
    assert_eq!(fx.vhci.state().opens, 0);
    assert!(!fx.state_dir.path().join("port0").exists());
}

#[tokio::test]
async fn test_remote_status_reported() {
    let fx = fixture(4, 4);
    let (_exporter, service) = exporter(MockReply::Status(OpStatus::NoDevice)).await;

    let result = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2").await;

    match result {
        Err(err @ Error::Protocol(ProtocolError::RemoteStatus { code: 4 })) => {
            assert!(err.to_string().contains("Device not found"));
        }
        other => panic!("Expected RemoteStatus, got {:?}", other),
    }
    assert_eq!(fx.vhci.state().opens, 0);
}

#[tokio::test]
async fn test_truncated_reply_is_io_error() {
    let fx = fixture(4, 4);
    let (_exporter, service) = exporter(MockReply::Raw(vec![0x01, 0x11, 0x00])).await;

    let result = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2").await;

    assert!(matches!(
        result,
        Err(Error::Protocol(ProtocolError::Io(_)))
    ));
    assert_eq!(fx.vhci.state().opens, 0);
}

#[tokio::test]
async fn test_contended_port_moves_to_next() {
    let fx = fixture(4, 4);
    fx.vhci.state().contended.insert(0);
    let device = create_mock_usb_device("1-2", DeviceSpeed::High);
    let (_exporter, service) = exporter(MockReply::Device(device)).await;

    let port = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2")
        .await
        .unwrap();

    assert_eq!(port, 1);
    assert_eq!(fx.vhci.state().binds.len(), 2);
    assert_eq!(fx.vhci.status(0), Some(PortStatus::Used));
    assert!(fx.state_dir.path().join("port1").exists());
}

#[tokio::test]
async fn test_endless_contention_gives_up() {
    let fx = fixture(4, 4);
    fx.vhci.state().always_busy = true;
    let device = create_mock_usb_device("1-2", DeviceSpeed::High);
    let (_exporter, service) = exporter(MockReply::Device(device)).await;

    let result = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2").await;

    assert!(matches!(result, Err(Error::NoFreePort { .. })));
    let state = fx.vhci.state();
    assert_eq!(state.binds.len(), 5);
    assert_eq!(state.opens, 1);
    assert_eq!(state.open_handles, 0);
}

#[tokio::test]
async fn test_no_free_port() {
    let fx = fixture(2, 2);
    fx.vhci.set_status(0, PortStatus::Used);
    fx.vhci.set_status(1, PortStatus::Used);
    let device = create_mock_usb_device("1-2", DeviceSpeed::High);
    let (_exporter, service) = exporter(MockReply::Device(device)).await;

    let result = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2").await;

    assert!(matches!(
        result,
        Err(Error::NoFreePort {
            speed: DeviceSpeed::High
        })
    ));
    assert!(fx.vhci.state().binds.is_empty());
    assert_eq!(fx.vhci.state().open_handles, 0);
}

#[tokio::test]
async fn test_fatal_bind_error() {
    let fx = fixture(4, 4);
    fx.vhci.state().fail_attach = true;
    let device = create_mock_usb_device("1-2", DeviceSpeed::High);
    let (_exporter, service) = exporter(MockReply::Device(device)).await;

    let result = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2").await;

    match result {
        Err(Error::Attach { port, source }) => {
            assert_eq!(port, 0);
            assert_eq!(source.raw_os_error(), Some(22));
        }
        other => panic!("Expected Attach error, got {:?}", other),
    }
    assert_eq!(fx.vhci.state().binds.len(), 1);
    assert_eq!(fx.vhci.state().open_handles, 0);
}

#[tokio::test]
async fn test_connection_refused() {
    let fx = fixture(4, 4);
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let service = listener.local_addr().unwrap().port().to_string();
    drop(listener);

    let result = attach_device(&fx.ctx, "127.0.0.1", &service, "1-2").await;

    assert!(matches!(result, Err(Error::Connect { .. })));
    assert_eq!(fx.vhci.state().opens, 0);
}

#[tokio::test]
async fn test_record_failure_leaves_port_attached() {
    let vhci = MockVhci::new(4, 4);
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("vhci_hcd");
    fs::write(&state_path, "occupied").unwrap();
    let ctx = AttachContext::new(vhci.clone(), ConnectionRecorder::new(&state_path));
    let device = create_mock_usb_device("1-2", DeviceSpeed::High);
    let (_exporter, service) = exporter(MockReply::Device(device)).await;

    let result = attach_device(&ctx, "127.0.0.1", &service, "1-2").await;

    assert!(matches!(result, Err(Error::Record { .. })));
    assert_eq!(vhci.status(0), Some(PortStatus::Used));
}
