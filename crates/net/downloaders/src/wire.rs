//! The wire protocol shared by the client's `do_request` and the server's
//! `handle_sync_request`: an 8-byte little-endian block number request,
//! answered with a 4-byte little-endian length prefix followed by that
//! many bytes of SSZ-encoded payload.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A framing-level failure: either the underlying I/O failed, or the peer
/// announced a length prefix larger than we're willing to allocate for.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The underlying stream returned an I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The announced response length exceeds `max_gossip_size`.
    #[error("announced response length {announced} exceeds max_gossip_size {limit}")]
    TooLarge {
        /// The length the peer announced.
        announced: u64,
        /// The configured ceiling.
        limit: u64,
    },
}

/// Writes an 8-byte little-endian block number request.
pub async fn write_request_number<S: AsyncWrite + Unpin>(
    stream: &mut S,
    number: u64,
) -> Result<(), WireError> {
    stream.write_all(&number.to_le_bytes()).await?;
    Ok(())
}

/// Reads an 8-byte little-endian block number request.
pub async fn read_request_number<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u64, WireError> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await?;
    Ok(u64::from_le_bytes(buf))
}

/// Writes a 4-byte little-endian length prefix followed by `body`.
pub async fn write_length_prefixed<S: AsyncWrite + Unpin>(
    stream: &mut S,
    body: &[u8],
) -> Result<(), WireError> {
    let len = body.len() as u32;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(body).await?;
    Ok(())
}

/// Reads a 4-byte little-endian length prefix, rejecting it outright if it
/// exceeds `max_len` (fail fast, before allocating a buffer for the body),
/// then reads exactly that many bytes.
pub async fn read_length_prefixed<S: AsyncRead + Unpin>(
    stream: &mut S,
    max_len: u64,
) -> Result<Vec<u8>, WireError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as u64;
    if len > max_len {
        return Err(WireError::TooLarge { announced: len, limit: max_len })
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_request_number() {
        let mut buf = Vec::new();
        write_request_number(&mut buf, 12345).await.unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_request_number(&mut cursor).await.unwrap(), 12345);
    }

    #[tokio::test]
    async fn round_trips_length_prefixed_body() {
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, b"hello world").await.unwrap();
        let mut cursor = Cursor::new(buf);
        let body = read_length_prefixed(&mut cursor, 1024).await.unwrap();
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn rejects_oversized_length_prefix_before_reading_body() {
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, &vec![0u8; 100]).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let err = read_length_prefixed(&mut cursor, 10).await.unwrap_err();
        assert_matches::assert_matches!(err, WireError::TooLarge { announced: 100, limit: 10 });
    }
}
