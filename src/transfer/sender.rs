use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::types::{CHUNK_SIZE, FrameHeader};
use crate::error::{Result, SdfsError};

/// Streams `local_path` to the receiver at `addr`.
///
/// Returns once the body is written and the write half is shut down; the
/// receiver reports completion through its own tracker, not to the sender.
pub async fn send_file(local_path: &Path, addr: SocketAddr, header: &FrameHeader) -> Result<u64> {
    let mut file = File::open(local_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SdfsError::NotFound(format!("{} is not stored locally", local_path.display()))
        } else {
            SdfsError::Io(e)
        }
    })?;

    let mut stream = dial(addr).await?;
    stream.write_all(&header.encode()).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;
    }
    stream.shutdown().await?;

    tracing::debug!(
        "Sent {} bytes of {} to {} as {}",
        sent,
        header.file_name,
        addr,
        header.transmission_id
    );
    Ok(sent)
}

/// Connects, re-dialing once on failure.
async fn dial(addr: SocketAddr) -> Result<TcpStream> {
    match TcpStream::connect(addr).await {
        Ok(stream) => Ok(stream),
        Err(first) => {
            tracing::debug!("Dial {} failed ({}), retrying once", addr, first);
            TcpStream::connect(addr).await.map_err(|e| {
                SdfsError::ConnectionFailure(format!("transfer receiver {addr}: {e}"))
            })
        }
    }
}
