use crate::session::Session;
use log::{info, warn};

/// Handles the CWD FTP command.
///
/// The target must be an existing directory below the root; otherwise the
/// current directory is left unchanged.
pub async fn handle_cwd_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    let target = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(target) => target,
        Err(e) => {
            warn!("[{}] CWD {} rejected: {}", session.peer, arg, e);
            return session.reply(550, "Failed to change directory").await;
        }
    };

    match session.ctx.fs.stat(&target).await {
        Ok(stat) if stat.is_dir => {
            info!("[{}] Changed directory to {}", session.peer, target.logical);
            session.current_dir = target.logical;
            session.reply(250, "Directory successfully changed").await
        }
        _ => {
            warn!("[{}] Not a directory: {}", session.peer, target.logical);
            session.reply(550, "Failed to change directory").await
        }
    }
}
