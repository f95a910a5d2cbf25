use crate::session::Session;

/// Handles the PWD FTP command.
pub async fn handle_pwd_command(session: &mut Session, _arg: &str) -> Result<(), std::io::Error> {
    let response = format!("\"{}\" is current directory", session.current_dir);
    session.reply(257, &response).await
}
