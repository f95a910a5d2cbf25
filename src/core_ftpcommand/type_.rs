use crate::session::Session;
use log::debug;

/// Handles the TYPE FTP command.
///
/// Every transfer is binary, so all representation types are acknowledged
/// the same way.
pub async fn handle_type_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    debug!("[{}] TYPE {} treated as binary", session.peer, arg);
    session.reply(200, "Type set to I").await
}
