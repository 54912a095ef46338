//! Polymorphic SMTP command objects.
//!
//! Grounded on `mailledger-smtp`'s `command::Command` enum — its
//! `serialize()` match arms are reused near-verbatim per surviving variant —
//! generalized from a closed enum into trait objects because the spec
//! requires per-command continuation behavior
//! (`next_command_line_after_continuation`,
//! `encode_command_after_continuation`, `cleanup`) that the session state
//! machine delegates to the command rather than switching on it externally.
//! The `async_trait` dependency mirrors `Govcraft-mail-laser`'s use of the
//! same crate for async trait objects.

pub mod auth;
pub mod data;
pub mod mail;
pub mod simple;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::{Error, FailureType};
use crate::reply::ReplyLine;

pub use auth::{AuthLoginCommand, AuthPlainCommand, AuthXOAuth2Command};
pub use data::{DataCommand, DataStreamCommand};
pub use mail::{MailFromCommand, RcptToCommand};
pub use simple::{
    EhloCommand, ExpnCommand, HeloCommand, HelpCommand, NoopCommand, QuitCommand, RsetCommand,
    StartTlsCommand, VrfyCommand,
};

/// Tag identifying a command's wire verb, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// `EHLO`
    Ehlo,
    /// `HELO`
    Helo,
    /// `MAIL FROM`
    MailFrom,
    /// `RCPT TO`
    RcptTo,
    /// `DATA` (buffered or streamed)
    Data,
    /// `RSET`
    Rset,
    /// `VRFY`
    Vrfy,
    /// `EXPN`
    Expn,
    /// `HELP`
    Help,
    /// `NOOP`
    Noop,
    /// `QUIT`
    Quit,
    /// `STARTTLS`
    StartTls,
    /// `AUTH PLAIN`
    AuthPlain,
    /// `AUTH LOGIN`
    AuthLogin,
    /// `AUTH XOAUTH2`
    AuthXOAuth2,
}

/// The channel's write half, as seen by a command producing continuation
/// payload. Any `AsyncWrite` implementor (a real socket, a TLS stream, or an
/// in-memory duplex in tests) satisfies this by blanket impl.
pub type CommandChannel = dyn AsyncWrite + Unpin + Send;

/// A single SMTP command: its wire bytes, whether it expects a server
/// continuation, and how to produce the next payload when the server
/// signals one.
#[async_trait]
pub trait SmtpCommand: Send {
    /// The bytes to send now. Must end in `\r\n`.
    fn command_line_bytes(&self) -> Vec<u8>;

    /// The command's wire-verb tag, for logging and metrics.
    fn command_type(&self) -> CommandType;

    /// `true` if [`Self::command_line_bytes`] must never be logged
    /// verbatim.
    fn is_sensitive(&self) -> bool {
        false
    }

    /// A loggable, redacted rendering of the command.
    fn debug_data(&self) -> String {
        String::from_utf8_lossy(&self.command_line_bytes())
            .trim_end()
            .to_string()
    }

    /// `true` if this command's continuation is produced by streaming bytes
    /// directly to the channel (via
    /// [`Self::encode_command_after_continuation`]) rather than by
    /// returning a single payload from
    /// [`Self::next_command_line_after_continuation`].
    fn expects_streamed_continuation(&self) -> bool {
        false
    }

    /// Produces the bytes to send after a 3xx intermediate reply.
    ///
    /// # Errors
    ///
    /// Returns [`FailureType::OperationNotSupportedForCommand`] for
    /// commands that never expect a continuation, and may return other
    /// failure types if producing the payload itself fails (e.g. a stream
    /// read error). Returning `Ok(None)` signals an irrecoverable failure
    /// to produce the payload without a specific cause.
    fn next_command_line_after_continuation(
        &mut self,
        _reply: &ReplyLine,
    ) -> Result<Option<Vec<u8>>, Error> {
        Err(Error::new(FailureType::OperationNotSupportedForCommand))
    }

    /// Streams the continuation payload (and its terminator, if any)
    /// directly to `channel`. Only called when
    /// [`Self::expects_streamed_continuation`] returns `true`.
    ///
    /// # Errors
    ///
    /// Returns [`FailureType::OperationNotSupportedForCommand`] if this
    /// command does not support streamed continuation, or
    /// [`FailureType::WriteToServerFailed`] if writing to the channel
    /// fails.
    async fn encode_command_after_continuation(
        &mut self,
        _channel: &mut CommandChannel,
        _reply: &ReplyLine,
    ) -> Result<(), Error> {
        Err(Error::new(FailureType::OperationNotSupportedForCommand))
    }

    /// Zeroes secret material (credentials, message bodies) and releases
    /// any held resources. Invoked exactly once after the command's future
    /// resolves, success or failure.
    fn cleanup(&mut self) {}
}

pub(crate) fn zero_bytes(buf: &mut Vec<u8>) {
    buf.iter_mut().for_each(|b| *b = 0);
    buf.clear();
}

#[cfg(test)]
pub(crate) fn wire_string(cmd: &dyn SmtpCommand) -> String {
    String::from_utf8(cmd.command_line_bytes()).expect("command bytes must be valid UTF-8")
}
