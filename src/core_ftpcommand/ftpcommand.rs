use crate::constants::MAX_COMMAND_LEN;

#[derive(Eq, Hash, PartialEq, Debug, Clone, Copy)]
pub enum FtpCommand {
    USER,
    PASS,
    QUIT,
    SYST,
    NOOP,
    FEAT,
    PWD,
    TYPE,
    CDUP,
    CWD,
    PASV,
    EPSV,
    OPTS,
    PORT,
    MLSD,
    LIST,
    NLST,
    RETR,
    STOR,
    RNFR,
    RNTO,
    DELE,
    MKD,
    RMD,
    SIZE,
    REST,
}

impl FtpCommand {
    pub fn from_str(cmd: &str) -> Option<FtpCommand> {
        match cmd.to_ascii_uppercase().as_str() {
            "USER" => Some(FtpCommand::USER),
            "PASS" => Some(FtpCommand::PASS),
            "QUIT" => Some(FtpCommand::QUIT),
            "SYST" => Some(FtpCommand::SYST),
            "NOOP" => Some(FtpCommand::NOOP),
            "FEAT" => Some(FtpCommand::FEAT),
            "PWD" | "XPWD" => Some(FtpCommand::PWD),
            "TYPE" => Some(FtpCommand::TYPE),
            "CDUP" | "XCUP" => Some(FtpCommand::CDUP),
            "CWD" => Some(FtpCommand::CWD),
            "PASV" => Some(FtpCommand::PASV),
            "EPSV" => Some(FtpCommand::EPSV),
            "OPTS" => Some(FtpCommand::OPTS),
            "PORT" => Some(FtpCommand::PORT),
            "MLSD" => Some(FtpCommand::MLSD),
            "LIST" => Some(FtpCommand::LIST),
            "NLST" => Some(FtpCommand::NLST),
            "RETR" => Some(FtpCommand::RETR),
            "STOR" => Some(FtpCommand::STOR),
            "RNFR" => Some(FtpCommand::RNFR),
            "RNTO" => Some(FtpCommand::RNTO),
            "DELE" => Some(FtpCommand::DELE),
            "MKD" => Some(FtpCommand::MKD),
            "RMD" => Some(FtpCommand::RMD),
            "SIZE" => Some(FtpCommand::SIZE),
            "REST" => Some(FtpCommand::REST),
            _ => None,
        }
    }

    /// Commands accepted before login.
    pub fn requires_auth(self) -> bool {
        !matches!(
            self,
            FtpCommand::USER
                | FtpCommand::PASS
                | FtpCommand::QUIT
                | FtpCommand::SYST
                | FtpCommand::NOOP
                | FtpCommand::FEAT
        )
    }
}

/// One parsed control line: upper-cased verb plus the raw argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub verb: String,
    pub arg: String,
}

impl CommandLine {
    /// Splits a control line into verb and argument. Returns `None` for
    /// blank lines. The argument keeps inner spaces (file names may have them).
    pub fn parse(line: &str) -> Option<CommandLine> {
        let line = line.trim_end_matches(['\r', '\n']).trim_start();
        let line = truncate_at_char_boundary(line, MAX_COMMAND_LEN);
        if line.trim().is_empty() {
            return None;
        }
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line.trim_end(), ""),
        };
        Some(CommandLine {
            verb: verb.to_ascii_uppercase(),
            arg: arg.to_string(),
        })
    }

    pub fn command(&self) -> Option<FtpCommand> {
        FtpCommand::from_str(&self.verb)
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
