//! Import negotiation
//!
//! One synchronous request/reply exchange per call:
//!
//! ```text
//! client                               exporter
//!   | OpCommon(REQ_IMPORT, status 0)     |
//!   | ImportRequest(busid[32])           |
//!   |----------------------------------->|
//!   |       OpCommon(REP_IMPORT, status) |
//!   |       UsbDevice (only if status 0) |
//!   |<-----------------------------------|
//! ```
//!
//! The echoed bus id must equal the requested one over the whole 32-byte
//! field, padding included.

use crate::error::Result;
use protocol::{
    BusId, ImportRequest, OpCode, OpCommon, ProtocolError, UsbDevice, read_async, write_async,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Ask the exporter for the device at `busid` and return its descriptor
///
/// Bus ids longer than [`BusId::MAX_LEN`] bytes are truncated before
/// sending; the exporter then sees (and must echo) the truncated id.
pub async fn query_import<S>(stream: &mut S, busid: &str) -> Result<UsbDevice>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !BusId::fits(busid) {
        warn!(
            "Bus id '{}' exceeds {} bytes and will be truncated",
            busid,
            BusId::MAX_LEN
        );
    }
    let requested = BusId::new(busid);

    write_async(stream, &OpCommon::request(OpCode::ReqImport)).await?;
    write_async(stream, &ImportRequest { busid: requested }).await?;
    debug!("Sent import request for {}", requested);

    let header: OpCommon = read_async(stream).await?;
    if let Err(e) = header.expect_reply(OpCode::RepImport) {
        debug!("Import request for {} rejected: {}", requested, e);
        return Err(e.into());
    }

    let device: UsbDevice = read_async(stream).await?;
    if device.busid != requested {
        return Err(ProtocolError::BusIdMismatch {
            requested: requested.to_string(),
            received: device.busid.to_string(),
        }
        .into());
    }

    debug!(
        "Imported {} ({:04x}:{:04x}, busnum={}, devnum={}, {})",
        device.busid, device.id_vendor, device.id_product, device.busnum, device.devnum, device.speed
    );

    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use common::test_utils::create_mock_usb_device;
    use protocol::{DeviceSpeed, OpStatus, encode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    /// Read the 40-byte request and return the bus id field the peer saw
    async fn read_request(peer: &mut DuplexStream) -> BusId {
        let header: OpCommon = read_async(peer).await.unwrap();
        assert_eq!(header, OpCommon::request(OpCode::ReqImport));
        let request: ImportRequest = read_async(peer).await.unwrap();
        request.busid
    }

    #[tokio::test]
    async fn test_import_success() {
        let (mut stream, mut peer) = duplex(1024);
        let device = create_mock_usb_device("1-2", DeviceSpeed::High);

        let exporter = tokio::spawn({
            let device = device.clone();
            async move {
                let busid = read_request(&mut peer).await;
                write_async(&mut peer, &OpCommon::reply(OpCode::RepImport, OpStatus::Ok))
                    .await
                    .unwrap();
                write_async(&mut peer, &device).await.unwrap();
                busid
            }
        });

        let imported = query_import(&mut stream, "1-2").await.unwrap();

        assert_eq!(imported, device);
        assert_eq!(exporter.await.unwrap(), BusId::new("1-2"));
    }

    #[tokio::test]
    async fn test_remote_status_stops_before_payload() {
        let (mut stream, mut peer) = duplex(1024);

        tokio::spawn(async move {
            read_request(&mut peer).await;
            write_async(
                &mut peer,
                &OpCommon::reply(OpCode::RepImport, OpStatus::NoDevice),
            )
            .await
            .unwrap();
            // Keep the stream open: reading a payload would hang here
            std::future::pending::<()>().await;
        });

        match query_import(&mut stream, "9-9").await {
            Err(Error::Protocol(ProtocolError::RemoteStatus { code })) => {
                assert_eq!(code, OpStatus::NoDevice as u32)
            }
            other => panic!("Expected RemoteStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_busid_mismatch() {
        let (mut stream, mut peer) = duplex(1024);

        tokio::spawn(async move {
            read_request(&mut peer).await;
            write_async(&mut peer, &OpCommon::reply(OpCode::RepImport, OpStatus::Ok))
                .await
                .unwrap();
            write_async(&mut peer, &create_mock_usb_device("1-3", DeviceSpeed::High))
                .await
                .unwrap();
        });

        match query_import(&mut stream, "1-2").await {
            Err(Error::Protocol(ProtocolError::BusIdMismatch { requested, received })) => {
                assert_eq!(requested, "1-2");
                assert_eq!(received, "1-3");
            }
            other => panic!("Expected BusIdMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_busid_mismatch_in_padding() {
        let (mut stream, mut peer) = duplex(1024);

        tokio::spawn(async move {
            read_request(&mut peer).await;
            let mut reply = encode(&OpCommon::reply(OpCode::RepImport, OpStatus::Ok)).unwrap();
            let mut payload = encode(&create_mock_usb_device("1-2", DeviceSpeed::High)).unwrap();
            // Garbage after the terminating NUL of the echoed bus id
            payload[256 + 10] = b'#';
            reply.extend(payload);
            peer.write_all(&reply).await.unwrap();
        });

        let result = query_import(&mut stream, "1-2").await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::BusIdMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_long_busid_is_truncated() {
        let (mut stream, mut peer) = duplex(1024);
        let long = format!("1-{}", "1.".repeat(20));
        let truncated = long[..BusId::MAX_LEN].to_string();

        let exporter = tokio::spawn({
            let truncated = truncated.clone();
            async move {
                let busid = read_request(&mut peer).await;
                write_async(&mut peer, &OpCommon::reply(OpCode::RepImport, OpStatus::Ok))
                    .await
                    .unwrap();
                write_async(&mut peer, &create_mock_usb_device(&truncated, DeviceSpeed::Full))
                    .await
                    .unwrap();
                busid
            }
        });

        let device = query_import(&mut stream, &long).await.unwrap();

        assert_eq!(device.busid.to_string_lossy(), truncated);
        assert_eq!(exporter.await.unwrap().to_string_lossy(), truncated);
    }

    #[tokio::test]
    async fn test_peer_hangs_up_mid_reply() {
        let (mut stream, mut peer) = duplex(1024);

        tokio::spawn(async move {
            read_request(&mut peer).await;
            write_async(&mut peer, &OpCommon::reply(OpCode::RepImport, OpStatus::Ok))
                .await
                .unwrap();
            let payload = encode(&create_mock_usb_device("1-2", DeviceSpeed::High)).unwrap();
            peer.write_all(&payload[..40]).await.unwrap();
        });

        let result = query_import(&mut stream, "1-2").await;
        assert!(matches!(result, Err(Error::Protocol(ProtocolError::Io(_)))));
    }

    #[tokio::test]
    async fn test_wrong_version_reply() {
        let (mut stream, mut peer) = duplex(1024);

        tokio::spawn(async move {
            read_request(&mut peer).await;
            peer.write_all(&[0x01, 0x06, 0x00, 0x03, 0, 0, 0, 0])
                .await
                .unwrap();
            let mut rest = Vec::new();
            let _ = peer.read_to_end(&mut rest).await;
        });

        let result = query_import(&mut stream, "1-2").await;
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::VersionMismatch { .. }))
        ));
    }
}
