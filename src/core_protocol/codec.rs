use crate::constants::SENTINEL;
use crate::core_error::ConnectionError;
use crate::core_network::transport::Connection;
use log::{debug, warn};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One message of a file body as seen by the receiver.
///
/// The sentinel is compared against the whole message, so a data chunk whose
/// bytes are exactly `EOF` ends the body early. That collision is part of the
/// wire protocol; a length-prefixed or escaped body would remove it.
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    End,
}

impl Chunk {
    pub fn classify(message: Vec<u8>) -> Chunk {
        if message == SENTINEL {
            Chunk::End
        } else {
            Chunk::Data(message)
        }
    }
}

#[derive(Debug, Default)]
pub struct SendSummary {
    pub bytes: u64,
    pub chunks: usize,
    /// Local read failure that cut the body short. The sentinel was still sent.
    pub read_error: Option<io::Error>,
}

#[derive(Debug, Default)]
pub struct ReceiveSummary {
    pub bytes: u64,
    /// First local write failure. The body was still drained up to the sentinel.
    pub write_error: Option<io::Error>,
}

pub async fn recv_chunk<S>(conn: &mut Connection<S>) -> Result<Chunk, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Ok(Chunk::classify(conn.receive().await?))
}

/// Streams `reader` as fixed-size chunks followed by the sentinel.
pub async fn send_stream<S, R>(
    conn: &mut Connection<S>,
    reader: &mut R,
    chunk_size: usize,
) -> Result<SendSummary, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut summary = SendSummary::default();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match fill_chunk(reader, &mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Local read failed after {} bytes: {}", summary.bytes, e);
                summary.read_error = Some(e);
                break;
            }
        };
        conn.send(&buffer[..n]).await?;
        summary.bytes += n as u64;
        summary.chunks += 1;
        if n < buffer.len() {
            break;
        }
    }

    conn.send(SENTINEL).await?;
    debug!(
        "Stream sent: {} bytes in {} chunks",
        summary.bytes, summary.chunks
    );
    Ok(summary)
}

/// Writes incoming chunks to `writer` until the sentinel arrives.
///
/// `first` is a message the caller already pulled off the connection, e.g. to
/// check it for an error status.
pub async fn receive_stream<S, W>(
    conn: &mut Connection<S>,
    first: Option<Vec<u8>>,
    writer: &mut W,
) -> Result<ReceiveSummary, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = ReceiveSummary::default();
    let mut pending = first.map(Chunk::classify);

    loop {
        let chunk = match pending.take() {
            Some(chunk) => chunk,
            None => recv_chunk(conn).await?,
        };
        let data = match chunk {
            Chunk::End => break,
            Chunk::Data(data) => data,
        };
        summary.bytes += data.len() as u64;
        if summary.write_error.is_none() {
            if let Err(e) = writer.write_all(&data).await {
                warn!("Local write failed, draining the rest of the stream: {}", e);
                summary.write_error = Some(e);
            }
        }
    }

    if summary.write_error.is_none() {
        if let Err(e) = writer.flush().await {
            summary.write_error = Some(e);
        }
    }
    Ok(summary)
}

/// Reads until `buffer` is full or the reader is exhausted, so chunk boundaries
/// depend only on the chunk size.
async fn fill_chunk<R>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
