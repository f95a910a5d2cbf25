use crate::session::Session;
use log::info;

/// Handles the PASS FTP command. Every password is accepted.
pub async fn handle_pass_command(
    session: &mut Session,
    _password: &str,
) -> Result<(), std::io::Error> {
    session.authenticated = true;
    info!(
        "[{}] User {} logged in",
        session.peer,
        session.username.as_deref().unwrap_or("(none)")
    );
    session.reply(230, "User logged in, proceed").await
}
