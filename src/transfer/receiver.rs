use std::net::SocketAddr;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::progress::TransmissionTracker;
use super::types::{CHUNK_SIZE, FrameHeader, WriteMode};
use crate::config::StorageDirs;
use crate::error::Result;

/// Accepts transfer streams and writes them under the tag's directory.
pub struct TransferReceiver {
    dirs: StorageDirs,
    tracker: Arc<TransmissionTracker>,
}

impl TransferReceiver {
    pub fn new(dirs: StorageDirs, tracker: Arc<TransmissionTracker>) -> Arc<Self> {
        Arc::new(Self { dirs, tracker })
    }

    /// Binds `addr` and spawns the accept loop. Returns the bound address.
    pub async fn start(self: Arc<Self>, addr: SocketAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        self.listen(listener)
    }

    /// Spawns the accept loop on an already bound listener.
    pub fn listen(self: Arc<Self>, listener: TcpListener) -> Result<SocketAddr> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Transfer receiver listening on {}", local_addr);

        tokio::spawn(async move {
            self.accept_loop(listener).await;
        });
        Ok(local_addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let receiver = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = receiver.handle_connection(stream).await {
                            tracing::warn!("Transfer from {} aborted: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Transfer accept failed: {}", e);
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let header = FrameHeader::read_from(&mut stream).await?;
        let path = header.tag.path(&self.dirs, &header.file_name);
        tracing::debug!(
            "Receiving {} ({:?}, {:?}) into {}",
            header.transmission_id,
            header.tag,
            header.mode,
            path.display()
        );

        // Truncating transfers land in a staging file and are renamed into
        // place once synced, so a partially received replica is never visible.
        let staging = match header.mode {
            WriteMode::Truncate => Some(
                header
                    .tag
                    .dir(&self.dirs)
                    .join(format!(".{}.{}.part", header.file_name, uuid::Uuid::new_v4())),
            ),
            WriteMode::Append => None,
        };
        let target = staging.as_ref().unwrap_or(&path);

        let mut options = OpenOptions::new();
        match header.mode {
            WriteMode::Truncate => options.write(true).create(true).truncate(true),
            WriteMode::Append => options.append(true).create(true),
        };
        let mut file = options.open(target).await?;

        let received = match copy_body(&mut stream, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                if let Some(staging) = &staging {
                    let _ = tokio::fs::remove_file(staging).await;
                }
                return Err(e);
            }
        };
        drop(file);
        if let Some(staging) = &staging {
            tokio::fs::rename(staging, &path).await?;
        }

        tracing::debug!(
            "Transmission {} complete: {} bytes -> {}",
            header.transmission_id,
            received,
            path.display()
        );
        self.tracker.mark_local(&header.transmission_id);
        Ok(())
    }
}

async fn copy_body(stream: &mut TcpStream, file: &mut File) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received: u64 = 0;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        received += n as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(received)
}
