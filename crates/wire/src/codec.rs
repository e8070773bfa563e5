//! Length-prefixed JSON framing: a 4-byte big-endian length prefix followed
//! by a JSON payload, usable over both TCP streams and Unix domain sockets.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The largest frame this protocol will read; guards against a corrupt or
/// malicious length prefix forcing an unbounded allocation.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame length {len} exceeds the {MAX_FRAME_LEN}-byte limit")]
    FrameTooLarge { len: u32 },
    #[error("json encode error: {0}")]
    Encode(serde_json::Error),
    #[error("json decode error: {0}")]
    Decode(serde_json::Error),
}

/// Serialize `value` to its raw JSON bytes, with no length prefix.
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(value).map_err(ProtocolError::Encode)
}

/// Deserialize raw JSON bytes (as returned by [`read_message`]) into `T`.
pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

/// Write `payload` prefixed with its big-endian `u32` length.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: u32::MAX,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single length-prefixed frame's payload.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge { len });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Read and decode a single framed value.
pub async fn read_value<R: AsyncRead + Unpin, T: serde::de::DeserializeOwned>(
    reader: &mut R,
) -> Result<T, ProtocolError> {
    let payload = read_message(reader).await?;
    decode(&payload)
}

/// Encode and write a single framed value.
pub async fn write_value<W: AsyncWrite + Unpin, T: serde::Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), ProtocolError> {
    let payload = encode(value)?;
    write_message(writer, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Response;

    #[test]
    fn encode_returns_json_without_length_prefix() {
        let encoded = encode(&Response::Ok).unwrap();
        let json_str = std::str::from_utf8(&encoded).unwrap();
        assert!(json_str.starts_with('{'), "should be a JSON object: {json_str}");
    }

    #[tokio::test]
    async fn read_write_message_roundtrip() {
        let original = b"hello world";
        let mut buffer = Vec::new();
        write_message(&mut buffer, original).await.unwrap();
        assert_eq!(buffer.len(), 4 + original.len());

        let mut cursor = std::io::Cursor::new(buffer);
        let read_back = read_message(&mut cursor).await.unwrap();
        assert_eq!(read_back, original);
    }

    #[tokio::test]
    async fn write_message_adds_big_endian_length_prefix() {
        let data = b"test data";
        let mut buffer = Vec::new();
        write_message(&mut buffer, data).await.unwrap();
        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(len, data.len());
        assert_eq!(&buffer[4..], data);
    }

    #[tokio::test]
    async fn rejects_a_frame_over_the_size_limit() {
        let mut cursor = std::io::Cursor::new((MAX_FRAME_LEN + 1).to_be_bytes().to_vec());
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn write_value_then_read_value_roundtrips_a_response() {
        let mut buffer = Vec::new();
        write_value(&mut buffer, &Response::Pong).await.unwrap();
        let mut cursor = std::io::Cursor::new(buffer);
        let value: Response = read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Response::Pong);
    }
}
