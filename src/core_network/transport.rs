use crate::constants::DEFAULT_MAX_MESSAGE_SIZE;
use crate::core_error::ConnectionError;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HEADER_LEN: usize = 4;

/// Message-oriented wrapper around a byte stream.
///
/// Every `send` is delivered as exactly one `receive` on the other side. Each
/// message travels behind a 4-byte big-endian length header; the header only
/// restores message boundaries and carries no protocol meaning, so end of a
/// file body is still signalled in-band by the `EOF` sentinel.
pub struct Connection<S> {
    stream: S,
    max_message_size: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_max_message_size(stream, DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(stream: S, max_message_size: usize) -> Self {
        Self {
            stream,
            max_message_size,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), ConnectionError> {
        let too_large = ConnectionError::MessageTooLarge {
            size: payload.len(),
            limit: self.max_message_size,
        };
        if payload.len() > self.max_message_size {
            return Err(too_large);
        }
        let len = u32::try_from(payload.len()).map_err(|_| too_large)?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), ConnectionError> {
        self.send(text.as_bytes()).await
    }

    /// Blocks until one whole message arrives. A peer that went away surfaces as
    /// `ConnectionError::PeerClosed`.
    pub async fn receive(&mut self) -> Result<Vec<u8>, ConnectionError> {
        let mut header = [0u8; HEADER_LEN];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(closed_or_io)?;

        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_message_size {
            return Err(ConnectionError::MessageTooLarge {
                size: len,
                limit: self.max_message_size,
            });
        }

        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(closed_or_io)?;
        Ok(payload)
    }

    pub async fn receive_text(&mut self) -> Result<String, ConnectionError> {
        let payload = self.receive().await?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    pub async fn close(&mut self) -> Result<(), ConnectionError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn closed_or_io(e: std::io::Error) -> ConnectionError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            ConnectionError::PeerClosed
        }
        _ => ConnectionError::Io(e),
    }
}
