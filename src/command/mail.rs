//! `MAIL FROM` and `RCPT TO`, grounded on `mailledger-smtp`'s
//! `Command::MailFrom`/`Command::RcptTo` serialize arms, generalized to use
//! [`crate::types::Address`] for envelope validation instead of raw strings.

use super::CommandType;
use crate::command::SmtpCommand;
use crate::types::Address;

/// `MAIL FROM:<addr>[ BODY=...][ SIZE=...]`
#[derive(Debug, Clone)]
pub struct MailFromCommand {
    from: Option<Address>,
    body: Option<String>,
    size: Option<usize>,
}

impl MailFromCommand {
    /// Creates a `MAIL FROM` command for the null reverse-path (`<>`), used
    /// for bounce/delivery-status messages.
    #[must_use]
    pub fn null_sender() -> Self {
        Self {
            from: None,
            body: None,
            size: None,
        }
    }

    /// Creates a `MAIL FROM` command for `from`.
    #[must_use]
    pub fn new(from: Address) -> Self {
        Self {
            from: Some(from),
            body: None,
            size: None,
        }
    }

    /// Sets the `BODY=` parameter (e.g. `"8BITMIME"`).
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the `SIZE=` parameter, the declared message size in octets.
    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

impl SmtpCommand for MailFromCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MAIL FROM:<");
        if let Some(from) = &self.from {
            buf.extend_from_slice(from.as_str().as_bytes());
        }
        buf.push(b'>');
        if let Some(body) = &self.body {
            buf.extend_from_slice(b" BODY=");
            buf.extend_from_slice(body.as_bytes());
        }
        if let Some(size) = self.size {
            buf.extend_from_slice(format!(" SIZE={size}").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }

    fn command_type(&self) -> CommandType {
        CommandType::MailFrom
    }
}

/// `RCPT TO:<addr>`
#[derive(Debug, Clone)]
pub struct RcptToCommand {
    to: Address,
}

impl RcptToCommand {
    /// Creates a `RCPT TO` command for `to`.
    #[must_use]
    pub fn new(to: Address) -> Self {
        Self { to }
    }
}

impl SmtpCommand for RcptToCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RCPT TO:<");
        buf.extend_from_slice(self.to.as_str().as_bytes());
        buf.extend_from_slice(b">\r\n");
        buf
    }

    fn command_type(&self) -> CommandType {
        CommandType::RcptTo
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::wire_string;

    #[test]
    fn mail_from_null_sender() {
        let cmd = MailFromCommand::null_sender();
        assert_eq!(wire_string(&cmd), "MAIL FROM:<>\r\n");
    }

    #[test]
    fn mail_from_simple() {
        let cmd = MailFromCommand::new(Address::new("sender@example.com").unwrap());
        assert_eq!(wire_string(&cmd), "MAIL FROM:<sender@example.com>\r\n");
    }

    #[test]
    fn mail_from_with_params() {
        let cmd = MailFromCommand::new(Address::new("sender@example.com").unwrap())
            .with_body("8BITMIME")
            .with_size(12345);
        assert_eq!(
            wire_string(&cmd),
            "MAIL FROM:<sender@example.com> BODY=8BITMIME SIZE=12345\r\n"
        );
    }

    #[test]
    fn rcpt_to_wire_format() {
        let cmd = RcptToCommand::new(Address::new("recipient@example.com").unwrap());
        assert_eq!(wire_string(&cmd), "RCPT TO:<recipient@example.com>\r\n");
    }
}
