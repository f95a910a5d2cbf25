use log::{error, info};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{TransferError, TransferLink};
use crate::core_ftpcommand::reply::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStep {
    Stored(usize),
    Complete,
}

/// State of one file upload.
pub struct UploadContext<F = File> {
    file: F,
    bytes_received: u64,
}

impl<F: AsyncWrite + Unpin> UploadContext<F> {
    pub fn new(file: F) -> Self {
        Self {
            file,
            bytes_received: 0,
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Appends one received segment to the file and flushes it. An empty
    /// segment means the peer closed the data connection.
    pub async fn on_receive(&mut self, bytes: &[u8]) -> Result<ReceiveStep, TransferError> {
        if bytes.is_empty() {
            self.file.flush().await.map_err(TransferError::File)?;
            return Ok(ReceiveStep::Complete);
        }
        self.file
            .write_all(bytes)
            .await
            .map_err(TransferError::File)?;
        self.file.flush().await.map_err(TransferError::File)?;
        self.bytes_received += bytes.len() as u64;
        Ok(ReceiveStep::Stored(bytes.len()))
    }

    /// Reads `source` until end of stream, storing every segment. A segment
    /// is read only after the previous one was stored.
    pub async fn run<R>(&mut self, source: &mut R, buffer_size: usize) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0; buffer_size.max(1)];
        loop {
            let n = source
                .read(&mut buffer)
                .await
                .map_err(TransferError::Socket)?;
            if self.on_receive(&buffer[..n]).await? == ReceiveStep::Complete {
                return Ok(self.bytes_received);
            }
        }
    }
}

/// Body of a STOR transfer task.
pub async fn run_upload(
    mut context: UploadContext,
    mut stream: TcpStream,
    buffer_size: usize,
    link: TransferLink,
) {
    let mut outcome = context.run(&mut stream, buffer_size).await;
    if outcome.is_ok() {
        if let Err(e) = context.file.sync_all().await {
            outcome = Err(TransferError::File(e));
        }
    }
    let received = context.bytes_received();
    drop(stream);
    drop(context);

    let reply = match outcome {
        Ok(bytes) => {
            info!("[{}] Upload complete, {} bytes stored", link.peer(), bytes);
            Reply::new(226, "Transfer complete")
        }
        Err(e) => {
            error!("[{}] Upload failed after {} bytes: {}", link.peer(), received, e);
            e.to_ftp_response()
        }
    };
    link.finish(reply).await;
}
