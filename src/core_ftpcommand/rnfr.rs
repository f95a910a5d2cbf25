use crate::session::Session;
use log::{info, warn};

/// Handles the RNFR (Rename From) FTP command.
///
/// Remembers the source path in this session until the next RNTO. A source
/// that does not exist leaves no pending rename behind.
pub async fn handle_rnfr_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    session.rename_from = None;

    let source = match session.ctx.fs.resolve(&session.current_dir, arg).await {
        Ok(source) => source,
        Err(e) => {
            warn!("[{}] RNFR {} rejected: {}", session.peer, arg, e);
            return session.send_reply(&e.to_ftp_response()).await;
        }
    };

    if !session.ctx.fs.exists(&source).await {
        warn!("[{}] RNFR source not found: {}", session.peer, source.logical);
        return session.reply(550, "File or directory not found").await;
    }

    info!("[{}] RNFR source set to {}", session.peer, source.logical);
    session.rename_from = Some(source);
    session
        .reply(350, "Requested file action pending further information")
        .await
}
