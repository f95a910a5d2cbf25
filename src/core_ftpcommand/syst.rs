use crate::session::Session;

pub async fn handle_syst_command(session: &mut Session, _arg: &str) -> Result<(), std::io::Error> {
    session.reply(215, "UNIX Type: L8").await
}
