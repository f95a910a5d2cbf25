use crate::session::Session;

/// Handles the OPTS FTP command. Only `UTF8 ON` is understood.
pub async fn handle_opts_command(session: &mut Session, arg: &str) -> Result<(), std::io::Error> {
    let mut words = arg.split_whitespace();
    let utf8_on = matches!(
        (words.next(), words.next(), words.next()),
        (Some(option), Some(value), None)
            if option.eq_ignore_ascii_case("UTF8") && value.eq_ignore_ascii_case("ON")
    );
    if utf8_on {
        session.reply(200, "UTF8 set to on").await
    } else {
        session.reply(502, "Option not supported").await
    }
}
