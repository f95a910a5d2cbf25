use crate::constants::FEATURES;
use crate::core_ftpcommand::reply::multiline;
use crate::helpers::send_response;
use crate::session::Session;

/// Handles the FEAT FTP command with a multi-line 211 reply.
pub async fn handle_feat_command(session: &mut Session, _arg: &str) -> Result<(), std::io::Error> {
    let response = multiline(211, "Extensions supported:", &FEATURES, "End");
    send_response(&session.writer, response.as_bytes()).await
}
