//! Message framing for the length-prefixed sync protocol
//!
//! Format: [4 bytes little-endian length][bincode payload]

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::protocol::{decode, encode, DecodeError, EncodeError};

/// Framing failures; `ConnectionClosed` is the normal end of a stream
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Peer closed the connection")]
    ConnectionClosed,
    #[error("Frame of {0} bytes exceeds the {1} byte limit")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// EOF mid-frame means the peer went away
fn eof_as_closed(error: io::Error) -> FramingError {
    match error.kind() {
        io::ErrorKind::UnexpectedEof => FramingError::ConnectionClosed,
        _ => FramingError::Io(error),
    }
}

fn check_size(len: usize) -> Result<(), FramingError> {
    if len > MAX_MESSAGE_SIZE {
        Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE))
    } else {
        Ok(())
    }
}

/// Read one raw frame
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.map_err(eof_as_closed)?;

    let len = u32::from_le_bytes(prefix) as usize;
    check_size(len)?;

    let mut payload = vec![0u8; len];
    if len > 0 {
        stream.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    }
    Ok(payload)
}

/// Write one raw frame and flush
pub async fn write_message<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
) -> Result<(), FramingError> {
    check_size(payload.len())?;
    stream.write_u32_le(payload.len() as u32).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Read and decode one typed frame
pub async fn read_frame<R, T>(stream: &mut R) -> Result<T, FramingError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let bytes = read_message(stream).await?;
    Ok(decode(&bytes)?)
}

/// Encode and write one typed frame
pub async fn write_frame<W, T>(stream: &mut W, message: &T) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = encode(message)?;
    write_message(stream, &bytes).await
}
