use crate::session::Session;
use log::{info, warn};

/// Handles the REST FTP command.
///
/// The offset applies to the next RETR or STOR only.
pub async fn handle_rest_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    match arg.trim().parse::<u64>() {
        Ok(offset) => {
            session.restart_offset = offset;
            info!("[{}] Restart offset set to {}", session.peer, offset);
            session
                .reply(350, &format!("Restarting at {}. Send STORE or RETRIEVE", offset))
                .await
        }
        Err(_) => {
            warn!("[{}] Invalid REST argument: {:?}", session.peer, arg);
            session.reply(501, "Syntax error in parameters or arguments").await
        }
    }
}
