//! Commands that never expect a continuation: one line out, one reply in.
//!
//! Wire formats reused near-verbatim from `mailledger-smtp`'s
//! `Command::serialize()` match arms for the surviving variants (EHLO, HELO,
//! RSET, NOOP, QUIT, VRFY); STARTTLS, EXPN, and HELP are written in the same
//! style for verbs the teacher's enum never covered.

use super::CommandType;
use crate::command::SmtpCommand;

fn line(parts: &[&str]) -> Vec<u8> {
    let mut buf = parts.join(" ").into_bytes();
    buf.extend_from_slice(b"\r\n");
    buf
}

/// `EHLO <hostname>`
#[derive(Debug, Clone)]
pub struct EhloCommand {
    hostname: String,
}

impl EhloCommand {
    /// Creates an `EHLO` command greeting the server as `hostname`.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

impl SmtpCommand for EhloCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["EHLO", &self.hostname])
    }

    fn command_type(&self) -> CommandType {
        CommandType::Ehlo
    }
}

/// `HELO <hostname>`
#[derive(Debug, Clone)]
pub struct HeloCommand {
    hostname: String,
}

impl HeloCommand {
    /// Creates a `HELO` command greeting the server as `hostname`.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

impl SmtpCommand for HeloCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["HELO", &self.hostname])
    }

    fn command_type(&self) -> CommandType {
        CommandType::Helo
    }
}

/// `STARTTLS`
#[derive(Debug, Clone, Default)]
pub struct StartTlsCommand;

impl StartTlsCommand {
    /// Creates a `STARTTLS` command.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SmtpCommand for StartTlsCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["STARTTLS"])
    }

    fn command_type(&self) -> CommandType {
        CommandType::StartTls
    }
}

/// `RSET`
#[derive(Debug, Clone, Default)]
pub struct RsetCommand;

impl RsetCommand {
    /// Creates a `RSET` command.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SmtpCommand for RsetCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["RSET"])
    }

    fn command_type(&self) -> CommandType {
        CommandType::Rset
    }
}

/// `VRFY <address>`
#[derive(Debug, Clone)]
pub struct VrfyCommand {
    address: String,
}

impl VrfyCommand {
    /// Creates a `VRFY` command asking the server to verify `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl SmtpCommand for VrfyCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["VRFY", &self.address])
    }

    fn command_type(&self) -> CommandType {
        CommandType::Vrfy
    }
}

/// `EXPN`
#[derive(Debug, Clone, Default)]
pub struct ExpnCommand;

impl ExpnCommand {
    /// Creates an `EXPN` command.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SmtpCommand for ExpnCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["EXPN"])
    }

    fn command_type(&self) -> CommandType {
        CommandType::Expn
    }
}

/// `HELP [argument]`
#[derive(Debug, Clone, Default)]
pub struct HelpCommand {
    argument: Option<String>,
}

impl HelpCommand {
    /// Creates a bare `HELP` command.
    #[must_use]
    pub fn new() -> Self {
        Self { argument: None }
    }

    /// Creates a `HELP <argument>` command.
    #[must_use]
    pub fn with_argument(argument: impl Into<String>) -> Self {
        Self {
            argument: Some(argument.into()),
        }
    }
}

impl SmtpCommand for HelpCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        match &self.argument {
            Some(arg) => line(&["HELP", arg]),
            None => line(&["HELP"]),
        }
    }

    fn command_type(&self) -> CommandType {
        CommandType::Help
    }
}

/// `NOOP`
#[derive(Debug, Clone, Default)]
pub struct NoopCommand;

impl NoopCommand {
    /// Creates a `NOOP` command.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SmtpCommand for NoopCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["NOOP"])
    }

    fn command_type(&self) -> CommandType {
        CommandType::Noop
    }
}

/// `QUIT`
#[derive(Debug, Clone, Default)]
pub struct QuitCommand;

impl QuitCommand {
    /// Creates a `QUIT` command.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SmtpCommand for QuitCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        line(&["QUIT"])
    }

    fn command_type(&self) -> CommandType {
        CommandType::Quit
    }
}
