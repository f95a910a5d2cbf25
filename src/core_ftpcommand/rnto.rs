use crate::core_fs::FsError;
use crate::session::Session;
use log::{error, info, warn};

/// Handles the RNTO (Rename To) FTP command.
///
/// Consumes the pending RNFR source of this session, whatever the outcome.
pub async fn handle_rnto_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    let Some(source) = session.rename_from.take() else {
        warn!("[{}] RNTO without RNFR", session.peer);
        return session.reply(503, "Bad sequence of commands (use RNFR first)").await;
    };

    let outcome = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(target) => session
            .ctx
            .fs
            .rename(&source, &target)
            .await
            .map(|_| target),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(target) => {
            info!(
                "[{}] Renamed {} to {}",
                session.peer, source.logical, target.logical
            );
            session.reply(250, "Rename successful").await
        }
        Err(FsError::AlreadyExists(target)) => {
            warn!("[{}] Rename target exists: {}", session.peer, target);
            session.reply(550, "File already exists").await
        }
        Err(e) => {
            error!("[{}] Failed to rename {}: {}", session.peer, source.logical, e);
            session.reply(550, "Rename operation failed").await
        }
    }
}
