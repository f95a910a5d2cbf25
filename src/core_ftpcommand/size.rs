use crate::session::Session;
use log::warn;

/// Handles the SIZE FTP command for regular files.
pub async fn handle_size_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    let stat = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(path) => session.ctx.fs.stat(&path).await,
        Err(e) => Err(e),
    };

    match stat {
        Ok(stat) if !stat.is_dir => session.reply(213, &stat.size.to_string()).await,
        Ok(_) => session.reply(550, "Not a regular file").await,
        Err(e) => {
            warn!("[{}] SIZE {} failed: {}", session.peer, arg, e);
            session.send_reply(&e.to_ftp_response()).await
        }
    }
}
