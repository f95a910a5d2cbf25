use crate::core_transfer::upload::{run_upload, UploadContext};
use crate::session::Session;
use log::{error, info};

/// Handles the STOR (Store File) FTP command once the data connection is established.
///
/// Without a restart offset the file is created or truncated. With one, the
/// first `offset` bytes are kept and the upload continues from there.
///
/// # Arguments
///
/// * `session` - The session issuing the command.
/// * `arg` - The name of the file to be stored.
/// * `preliminary_sent` - Whether a 150 reply already went out for this command.
///
/// # Returns
///
/// Result<(), std::io::Error> indicating whether the replies could be sent.
pub async fn handle_stor_command(
    session: &mut Session,
    arg: &str,
    preliminary_sent: bool,
) -> Result<(), std::io::Error> {
    let Some(stream) = session.take_data_stream() else {
        return session.reply(425, "Use PASV first").await;
    };
    let offset = std::mem::take(&mut session.restart_offset);

    let file = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(path) => session.ctx.fs.open_write(&path, offset).await.map(|f| (f, path)),
        Err(e) => Err(e),
    };
    let (file, path) = match file {
        Ok(opened) => opened,
        Err(e) => {
            error!("[{}] Failed to create file: {}: {}", session.peer, arg, e);
            drop(stream);
            return session.send_reply(&e.to_ftp_response()).await;
        }
    };

    if !preliminary_sent {
        session.reply(150, "Ready to receive file").await?;
    }
    info!(
        "[{}] Receiving file: {} at offset {}",
        session.peer, path.logical, offset
    );
    let buffer_size = session.ctx.config.server.upload_buffer_size;
    let task = tokio::spawn(run_upload(
        UploadContext::new(file),
        stream,
        buffer_size,
        session.transfer_link(),
    ));
    session.start_transfer(task);
    Ok(())
}
