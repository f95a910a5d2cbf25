use log::{debug, error, warn};

use crate::core_ftpcommand::ftpcommand::{CommandLine, FtpCommand};
use crate::core_ftpcommand::{
    cdup, cwd, dele, feat, list, mkd, noop, opts, pass, pwd, quit, rest, retr, rmd, rnfr, rnto,
    size, stor, syst, type_, user,
};
use crate::core_network::pasv;
use crate::session::{PendingCommand, Session};

/// Parses one control line and runs the matching command handler.
///
/// Unknown verbs get 502 and commands other than the login ones get 530
/// before login. A handler error means the control connection is broken,
/// so the session is marked for close.
pub async fn dispatch(session: &mut Session, line: &str) {
    let Some(command_line) = CommandLine::parse(line) else {
        return;
    };
    if command_line.verb == "PASS" {
        debug!("[{}] Received command: PASS ****", session.peer);
    } else {
        debug!(
            "[{}] Received command: {} {} ({:?})",
            session.peer,
            command_line.verb,
            command_line.arg,
            session.state()
        );
    }

    let result = match command_line.command() {
        None => {
            warn!("[{}] Unknown command: {}", session.peer, command_line.verb);
            session.reply(502, "Command not implemented").await
        }
        Some(command) if command.requires_auth() && !session.authenticated => {
            session.reply(530, "Not logged in").await
        }
        Some(command) => execute(session, command, &command_line.arg).await,
    };

    if let Err(e) = result {
        error!(
            "[{}] Error handling command {}: {:?}",
            session.peer, command_line.verb, e
        );
        session.mark_for_close();
    }
}

fn requires_argument(command: FtpCommand) -> bool {
    matches!(
        command,
        FtpCommand::USER
            | FtpCommand::CWD
            | FtpCommand::RETR
            | FtpCommand::STOR
            | FtpCommand::RNFR
            | FtpCommand::RNTO
            | FtpCommand::DELE
            | FtpCommand::MKD
            | FtpCommand::RMD
            | FtpCommand::SIZE
            | FtpCommand::REST
    )
}

async fn execute(session: &mut Session, command: FtpCommand, arg: &str) -> Result<(), std::io::Error> {
    if requires_argument(command) && arg.is_empty() {
        warn!("[{}] {:?} received with no arguments", session.peer, command);
        return session
            .reply(501, "Syntax error in parameters or arguments")
            .await;
    }

    match command {
        FtpCommand::USER => user::handle_user_command(session, arg).await,
        FtpCommand::PASS => pass::handle_pass_command(session, arg).await,
        FtpCommand::QUIT => quit::handle_quit_command(session, arg).await,
        FtpCommand::SYST => syst::handle_syst_command(session, arg).await,
        FtpCommand::NOOP => noop::handle_noop_command(session, arg).await,
        FtpCommand::FEAT => feat::handle_feat_command(session, arg).await,
        FtpCommand::PWD => pwd::handle_pwd_command(session, arg).await,
        FtpCommand::TYPE => type_::handle_type_command(session, arg).await,
        FtpCommand::CDUP => cdup::handle_cdup_command(session, arg).await,
        FtpCommand::CWD => cwd::handle_cwd_command(session, arg).await,
        FtpCommand::PASV => pasv::handle_pasv_command(session, arg).await,
        FtpCommand::EPSV => pasv::handle_epsv_command(session, arg).await,
        FtpCommand::OPTS => opts::handle_opts_command(session, arg).await,
        FtpCommand::PORT => {
            session
                .reply(502, "PORT not supported, use PASV instead")
                .await
        }
        FtpCommand::MLSD => {
            session
                .reply(502, "MLSD not supported, use LIST instead")
                .await
        }
        FtpCommand::RNFR => rnfr::handle_rnfr_command(session, arg).await,
        FtpCommand::RNTO => rnto::handle_rnto_command(session, arg).await,
        FtpCommand::DELE => dele::handle_dele_command(session, arg).await,
        FtpCommand::MKD => mkd::handle_mkd_command(session, arg).await,
        FtpCommand::RMD => rmd::handle_rmd_command(session, arg).await,
        FtpCommand::SIZE => size::handle_size_command(session, arg).await,
        FtpCommand::REST => rest::handle_rest_command(session, arg).await,
        FtpCommand::LIST | FtpCommand::NLST | FtpCommand::RETR | FtpCommand::STOR => {
            gate_data_command(session, command, arg).await
        }
    }
}

/// Runs a data command now if its connection is up, or parks it until the
/// passive listener accepts one.
async fn gate_data_command(
    session: &mut Session,
    command: FtpCommand,
    arg: &str,
) -> Result<(), std::io::Error> {
    if session.has_connected_data() {
        return run_data_command(session, command, arg, false).await;
    }
    if session.is_awaiting_data() {
        debug!("[{}] {:?} waits for the data connection", session.peer, command);
        session.pending_command = Some(PendingCommand {
            command,
            arg: arg.to_string(),
        });
        return session.reply(150, "Waiting for data connection").await;
    }
    session.reply(425, "Use PASV first").await
}

/// Starts a data command on the connected data channel. `preliminary_sent`
/// is set when the 150 reply was already sent while waiting for the connection.
pub async fn run_data_command(
    session: &mut Session,
    command: FtpCommand,
    arg: &str,
    preliminary_sent: bool,
) -> Result<(), std::io::Error> {
    match command {
        FtpCommand::LIST | FtpCommand::NLST => {
            list::handle_list_command(session, preliminary_sent).await
        }
        FtpCommand::RETR => retr::handle_retr_command(session, arg, preliminary_sent).await,
        FtpCommand::STOR => stor::handle_stor_command(session, arg, preliminary_sent).await,
        other => {
            warn!("[{}] {:?} does not use the data connection", session.peer, other);
            Ok(())
        }
    }
}
