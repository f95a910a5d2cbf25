use crate::session::Session;
use log::info;

/// Handles the USER FTP command.
///
/// Records the user name and asks for a password. Any name is accepted.
///
/// # Arguments
///
/// * `session` - The session issuing the command.
/// * `username` - The user name provided by the client.
///
/// # Returns
///
/// Result<(), std::io::Error> indicating whether the reply could be sent.
pub async fn handle_user_command(
    session: &mut Session,
    username: &str,
) -> Result<(), std::io::Error> {
    info!("[{}] Received USER command with username: {}", session.peer, username);

    session.username = Some(username.to_string());
    session.authenticated = false;

    if username.eq_ignore_ascii_case("anonymous") {
        info!("Anonymous login initiated for username: {}", username);
        session
            .reply(331, "Anonymous login okay, send your complete email address as password")
            .await
    } else {
        session.reply(331, "User name okay, need password").await
    }
}
