use crate::core_fs::path::parent_of;
use crate::session::Session;
use log::info;

/// Handles the CDUP FTP command. At the root this stays at the root.
pub async fn handle_cdup_command(session: &mut Session, _arg: &str) -> Result<(), std::io::Error> {
    session.current_dir = parent_of(&session.current_dir);
    info!("[{}] Changed directory to {}", session.peer, session.current_dir);
    session.reply(250, "Directory changed to parent").await
}
