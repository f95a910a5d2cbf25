use crate::session::Session;
use log::{error, info};

/// Handles the DELE (Delete File) FTP command.
///
/// # Arguments
///
/// * `session` - The session issuing the command.
/// * `arg` - The file to delete, relative to the current directory.
///
/// # Returns
///
/// Result<(), std::io::Error> indicating whether the reply could be sent.
pub async fn handle_dele_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    let outcome = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(path) => session.ctx.fs.unlink(&path).await.map(|_| path),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(path) => {
            info!("[{}] File deleted successfully: {}", session.peer, path.logical);
            session.reply(250, "Delete operation successful").await
        }
        Err(e) => {
            error!("[{}] Failed to delete {}: {}", session.peer, arg, e);
            session.send_reply(&e.to_ftp_response()).await
        }
    }
}
