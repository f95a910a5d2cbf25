use crate::session::Session;
use log::{error, info};

/// Handles the MKD (Make Directory) FTP command.
///
/// Creates one directory; missing intermediate directories are not created.
///
/// # Arguments
///
/// * `session` - The session issuing the command.
/// * `arg` - The directory name to create.
///
/// # Returns
///
/// Result<(), std::io::Error> indicating whether the reply could be sent.
pub async fn handle_mkd_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    let outcome = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(path) => session.ctx.fs.mkdir(&path).await.map(|_| path),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(path) => {
            info!("[{}] Directory created successfully: {}", session.peer, path.logical);
            session
                .reply(257, &format!("\"{}\" created", path.logical))
                .await
        }
        Err(e) => {
            error!("[{}] Failed to create directory {}: {}", session.peer, arg, e);
            session.send_reply(&e.to_ftp_response()).await
        }
    }
}
