use crate::session::Session;

pub async fn handle_noop_command(session: &mut Session, _arg: &str) -> Result<(), std::io::Error> {
    session.reply(200, "NOOP ok").await
}
