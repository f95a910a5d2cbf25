use crate::session::Session;
use log::info;

/// Handles the QUIT FTP command.
///
/// The session is only marked here; its sockets are released by the next sweep.
pub async fn handle_quit_command(session: &mut Session, _arg: &str) -> Result<(), std::io::Error> {
    info!("[{}] Client requested QUIT", session.peer);
    let result = session.reply(221, "Goodbye").await;
    session.mark_for_close();
    result
}
