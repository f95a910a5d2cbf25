use crate::session::Session;
use log::{error, info};

/// Handles the RMD (Remove Directory) FTP command.
///
/// Only empty directories are removed; anything else is answered with 550
/// and left untouched.
pub async fn handle_rmd_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    let outcome = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(path) if path.logical == "/" => {
            error!("[{}] Refusing to remove the root directory", session.peer);
            return session.reply(550, "Permission denied").await;
        }
        Ok(path) => session.ctx.fs.rmdir(&path).await.map(|_| path),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(path) => {
            info!("[{}] Directory removed successfully: {}", session.peer, path.logical);
            session.reply(250, "Remove directory operation successful").await
        }
        Err(e) => {
            error!("[{}] Failed to remove directory {}: {}", session.peer, arg, e);
            session.send_reply(&e.to_ftp_response()).await
        }
    }
}
