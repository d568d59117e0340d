//! Fixed-layout wire encoding
//!
//! Every USB/IP structure has a fixed size and big-endian integers, so a
//! structure is encoded by writing its fields in order and decoded by
//! reading exactly [`WireFormat::SIZE`] bytes.
//!
//! # Example
//! ```
//! use protocol::{OpCode, OpCommon, WireFormat, decode, encode};
//!
//! let header = OpCommon::request(OpCode::ReqImport);
//! let bytes = encode(&header).unwrap();
//! assert_eq!(bytes.len(), OpCommon::SIZE);
//!
//! let decoded: OpCommon = decode(&bytes).unwrap();
//! assert_eq!(decoded, header);
//! ```

use crate::error::{ProtocolError, Result};
use std::io::{Cursor, Read, Write};

#[cfg(feature = "async")]
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A structure with a fixed on-wire size
pub trait WireFormat: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Read the structure from a reader
    fn read_from<R: Read>(reader: &mut R) -> Result<Self>;

    /// Write the structure to a writer
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()>;
}

/// Encode a structure into a freshly allocated buffer
pub fn encode<T: WireFormat>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(T::SIZE);
    value.write_to(&mut buf)?;
    Ok(buf)
}

/// Decode a structure from the start of `bytes`
pub fn decode<T: WireFormat>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < T::SIZE {
        return Err(ProtocolError::BufferTooSmall {
            needed: T::SIZE,
            available: bytes.len(),
        });
    }
    T::read_from(&mut Cursor::new(&bytes[..T::SIZE]))
}

/// Read exactly one structure from an async stream
#[cfg(feature = "async")]
pub async fn read_async<T, R>(reader: &mut R) -> Result<T>
where
    T: WireFormat,
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; T::SIZE];
    reader.read_exact(&mut buf).await?;
    decode(&buf)
}

/// Write one structure to an async stream and flush it
#[cfg(feature = "async")]
pub async fn write_async<T, W>(writer: &mut W, value: &T) -> Result<()>
where
    T: WireFormat,
    W: AsyncWrite + Unpin,
{
    let bytes = encode(value)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Copy `value` into a NUL-padded field of `N` bytes, keeping at most `N - 1` bytes
pub(crate) fn fixed_field<const N: usize>(value: &str) -> [u8; N] {
    let mut field = [0u8; N];
    let len = value.len().min(N - 1);
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
    field
}

/// Significant prefix of a NUL-padded field
pub(crate) fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
