use log::{error, info};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{TransferError, TransferLink};
use crate::core_ftpcommand::reply::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStep {
    Sent(usize),
    Eof,
}

/// State of one file download: the open file and the chunk buffer.
pub struct DownloadContext<F = File> {
    file: F,
    buffer: Vec<u8>,
    bytes_sent: u64,
}

impl<F: AsyncRead + Unpin> DownloadContext<F> {
    pub fn new(file: F, chunk_size: usize) -> Self {
        Self {
            file,
            buffer: vec![0; chunk_size.max(1)],
            bytes_sent: 0,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Reads at most one chunk and hands all of it to `sink`. Waits for the
    /// sink to take the whole chunk, so only one chunk is ever in flight.
    pub async fn send_step<W>(&mut self, sink: &mut W) -> Result<SendStep, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let n = self
            .file
            .read(&mut self.buffer)
            .await
            .map_err(TransferError::File)?;
        if n == 0 {
            return Ok(SendStep::Eof);
        }
        sink.write_all(&self.buffer[..n])
            .await
            .map_err(TransferError::Socket)?;
        self.bytes_sent += n as u64;
        Ok(SendStep::Sent(n))
    }

    /// Sends the rest of the file and flushes the sink.
    pub async fn run<W>(&mut self, sink: &mut W) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        while let SendStep::Sent(_) = self.send_step(sink).await? {}
        sink.flush().await.map_err(TransferError::Socket)?;
        Ok(self.bytes_sent)
    }
}

/// Body of a RETR transfer task.
pub async fn run_download(mut context: DownloadContext, mut stream: TcpStream, link: TransferLink) {
    let outcome = match context.run(&mut stream).await {
        Ok(bytes) => stream
            .shutdown()
            .await
            .map(|_| bytes)
            .map_err(TransferError::Socket),
        Err(e) => Err(e),
    };
    let sent = context.bytes_sent();
    // file and socket are released before the final reply
    drop(stream);
    drop(context);

    let reply = match outcome {
        Ok(bytes) => {
            info!("[{}] Download complete, {} bytes sent", link.peer(), bytes);
            Reply::new(226, "Transfer complete")
        }
        Err(e) => {
            error!("[{}] Download failed after {} bytes: {}", link.peer(), sent, e);
            e.to_ftp_response()
        }
    };
    link.finish(reply).await;
}
