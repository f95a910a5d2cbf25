use crate::core_transfer::download::{run_download, DownloadContext};
use crate::session::Session;
use log::{error, info};

/// Handles the RETR (Retrieve) FTP command once the data connection is established.
///
/// Opens the file at the pending restart offset and hands it to a transfer
/// task that streams it chunk by chunk. The restart offset is consumed.
///
/// # Arguments
///
/// * `session` - The session issuing the command.
/// * `arg` - The name of the file to retrieve.
/// * `preliminary_sent` - Whether a 150 reply already went out for this command.
///
/// # Returns
///
/// Result<(), std::io::Error> indicating whether the replies could be sent.
pub async fn handle_retr_command(
    session: &mut Session,
    arg: &str,
    preliminary_sent: bool,
) -> Result<(), std::io::Error> {
    let Some(stream) = session.take_data_stream() else {
        return session.reply(425, "Use PASV first").await;
    };
    let offset = std::mem::take(&mut session.restart_offset);

    let file = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(path) => session.ctx.fs.open_read(&path, offset).await.map(|f| (f, path)),
        Err(e) => Err(e),
    };
    let (file, path) = match file {
        Ok(opened) => opened,
        Err(e) => {
            error!("[{}] File could not be opened: {}: {}", session.peer, arg, e);
            drop(stream);
            return session.send_reply(&e.to_ftp_response()).await;
        }
    };

    if !preliminary_sent {
        session
            .reply(150, "Opening BINARY mode data connection")
            .await?;
    }
    info!(
        "[{}] Sending file: {} from offset {}",
        session.peer, path.logical, offset
    );
    let context = DownloadContext::new(file, session.ctx.config.server.download_chunk_size);
    let task = tokio::spawn(run_download(context, stream, session.transfer_link()));
    session.start_transfer(task);
    Ok(())
}
