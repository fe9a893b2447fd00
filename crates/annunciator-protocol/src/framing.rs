//! Length-prefixed framing.
//!
//! Every upstream message travels as a 4-byte big-endian payload length
//! followed by the serialized payload.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

/// Largest payload accepted from the peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("frame too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Async stream with framed, timed reads and writes.
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: S,
    io_timeout: Duration,
    max_len: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream,
            io_timeout,
            max_len: MAX_FRAME_LEN,
        }
    }

    /// Change the timeout applied to each subsequent read or write.
    pub fn set_timeout(&mut self, io_timeout: Duration) {
        self.io_timeout = io_timeout;
    }

    /// Send one framed payload.
    pub async fn send_frame(&mut self, data: &[u8]) -> Result<(), FrameError> {
        let len = u32::try_from(data.len()).map_err(|_| FrameError::TooLarge {
            len: data.len(),
            max: u32::MAX as usize,
        })?;

        let mut frame = Vec::with_capacity(4 + data.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(data);

        timeout(self.io_timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| FrameError::Timeout("frame write"))??;
        self.stream.flush().await?;
        trace!(len = data.len(), "frame sent");
        Ok(())
    }

    /// Receive one framed payload.
    pub async fn receive_frame(&mut self) -> Result<Vec<u8>, FrameError> {
        let mut len_bytes = [0u8; 4];
        timeout(self.io_timeout, self.stream.read_exact(&mut len_bytes))
            .await
            .map_err(|_| FrameError::Timeout("frame length read"))??;

        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > self.max_len {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_len,
            });
        }

        let mut data = vec![0u8; len];
        timeout(self.io_timeout, self.stream.read_exact(&mut data))
            .await
            .map_err(|_| FrameError::Timeout("frame payload read"))??;
        trace!(len, "frame received");
        Ok(data)
    }

    pub async fn send_message<T: Serialize>(&mut self, message: &T) -> Result<(), FrameError> {
        let payload = serde_json::to_vec(message)?;
        self.send_frame(&payload).await
    }

    pub async fn receive_message<T: DeserializeOwned>(&mut self) -> Result<T, FrameError> {
        let payload = self.receive_frame().await?;
        Ok(serde_json::from_slice(&payload)?)
    }
}
