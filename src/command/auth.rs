//! `AUTH PLAIN`, `AUTH LOGIN`, and `AUTH XOAUTH2`.
//!
//! `AUTH PLAIN`'s wire form is grounded on `mailledger-smtp`'s
//! `Command::Auth` serialize arm (`AUTH <mechanism>[ <initial-response>]`).
//! The XOAUTH2 payload format (`user=<user>\x01auth=Bearer
//! <token>\x01\x01`) is grounded on `mailledger-oauth::sasl::
//! xoauth2_response`, reimplemented locally because that crate's SMTP
//! consumer is out of scope here. Credentials are stored as `Vec<u8>`
//! rather than `String` so `cleanup` can zero them in place without
//! `unsafe`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{zero_bytes, CommandType};
use crate::command::SmtpCommand;
use crate::error::{Error, FailureType};
use crate::reply::ReplyLine;

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// `AUTH PLAIN <base64(NUL user NUL pass)>`. Never expects a continuation;
/// a 3xx reply at this point is a protocol error the session surfaces as
/// [`FailureType::InvalidServerResponse`].
pub struct AuthPlainCommand {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl std::fmt::Debug for AuthPlainCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPlainCommand").finish_non_exhaustive()
    }
}

impl AuthPlainCommand {
    /// Creates an `AUTH PLAIN` command for `username`/`password`.
    #[must_use]
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn initial_response(&self) -> String {
        let mut plain = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        plain.push(0);
        plain.extend_from_slice(&self.username);
        plain.push(0);
        plain.extend_from_slice(&self.password);
        b64(&plain)
    }
}

impl SmtpCommand for AuthPlainCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"AUTH PLAIN ");
        buf.extend_from_slice(self.initial_response().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf
    }

    fn command_type(&self) -> CommandType {
        CommandType::AuthPlain
    }

    fn is_sensitive(&self) -> bool {
        true
    }

    fn debug_data(&self) -> String {
        "AUTH PLAIN <redacted>".to_string()
    }

    fn cleanup(&mut self) {
        zero_bytes(&mut self.username);
        zero_bytes(&mut self.password);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStage {
    AwaitingUsernamePrompt,
    AwaitingPasswordPrompt,
    Done,
}

/// `AUTH LOGIN`, a two-round continuation exchange: the first `334` prompt
/// is answered with `base64(username)`, the second with `base64(password)`.
pub struct AuthLoginCommand {
    username: Vec<u8>,
    password: Vec<u8>,
    stage: LoginStage,
}

impl std::fmt::Debug for AuthLoginCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthLoginCommand")
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl AuthLoginCommand {
    /// Creates an `AUTH LOGIN` command for `username`/`password`.
    #[must_use]
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            stage: LoginStage::AwaitingUsernamePrompt,
        }
    }
}

impl SmtpCommand for AuthLoginCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        b"AUTH LOGIN\r\n".to_vec()
    }

    fn command_type(&self) -> CommandType {
        CommandType::AuthLogin
    }

    fn is_sensitive(&self) -> bool {
        true
    }

    fn debug_data(&self) -> String {
        "AUTH LOGIN <redacted>".to_string()
    }

    fn next_command_line_after_continuation(
        &mut self,
        reply: &ReplyLine,
    ) -> Result<Option<Vec<u8>>, Error> {
        if reply.code != 334 {
            return Err(Error::new(FailureType::InvalidServerResponse).with_detail(format!(
                "expected 334 continuation for AUTH LOGIN, got {}",
                reply.code
            )));
        }
        match self.stage {
            LoginStage::AwaitingUsernamePrompt => {
                self.stage = LoginStage::AwaitingPasswordPrompt;
                let mut line = b64(&self.username).into_bytes();
                line.extend_from_slice(b"\r\n");
                Ok(Some(line))
            }
            LoginStage::AwaitingPasswordPrompt => {
                self.stage = LoginStage::Done;
                let mut line = b64(&self.password).into_bytes();
                line.extend_from_slice(b"\r\n");
                Ok(Some(line))
            }
            LoginStage::Done => Err(Error::new(FailureType::OperationNotSupportedForCommand)
                .with_detail("AUTH LOGIN already completed both continuations")),
        }
    }

    fn cleanup(&mut self) {
        zero_bytes(&mut self.username);
        zero_bytes(&mut self.password);
    }
}

/// `AUTH XOAUTH2 <base64(user=<user>\x01auth=Bearer <token>\x01\x01)>`.
///
/// On a `334` continuation (typically an error challenge describing why
/// the token was rejected) the spec calls for aborting cleanly by
/// responding with an empty line rather than retrying.
pub struct AuthXOAuth2Command {
    user: Vec<u8>,
    token: Vec<u8>,
}

impl std::fmt::Debug for AuthXOAuth2Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthXOAuth2Command").finish_non_exhaustive()
    }
}

impl AuthXOAuth2Command {
    /// Creates an `AUTH XOAUTH2` command for `user`/`token`.
    #[must_use]
    pub fn new(user: impl Into<Vec<u8>>, token: impl Into<Vec<u8>>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }

    fn initial_response(&self) -> String {
        let mut raw = Vec::with_capacity(self.user.len() + self.token.len() + 16);
        raw.extend_from_slice(b"user=");
        raw.extend_from_slice(&self.user);
        raw.push(1);
        raw.extend_from_slice(b"auth=Bearer ");
        raw.extend_from_slice(&self.token);
        raw.push(1);
        raw.push(1);
        b64(&raw)
    }
}

impl SmtpCommand for AuthXOAuth2Command {
    fn command_line_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"AUTH XOAUTH2 ");
        buf.extend_from_slice(self.initial_response().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf
    }

    fn command_type(&self) -> CommandType {
        CommandType::AuthXOAuth2
    }

    fn is_sensitive(&self) -> bool {
        true
    }

    fn debug_data(&self) -> String {
        "AUTH XOAUTH2 <redacted>".to_string()
    }

    fn next_command_line_after_continuation(
        &mut self,
        reply: &ReplyLine,
    ) -> Result<Option<Vec<u8>>, Error> {
        if reply.code != 334 {
            return Err(Error::new(FailureType::InvalidServerResponse).with_detail(format!(
                "expected 334 continuation for AUTH XOAUTH2, got {}",
                reply.code
            )));
        }
        Ok(Some(b"\r\n".to_vec()))
    }

    fn cleanup(&mut self) {
        zero_bytes(&mut self.user);
        zero_bytes(&mut self.token);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::wire_string;

    fn continuation(code: u16) -> ReplyLine {
        ReplyLine::parse(&format!("{code} go")).unwrap()
    }

    #[test]
    fn auth_plain_matches_exact_wire_bytes_from_scenario() {
        let cmd = AuthPlainCommand::new(
            "test_user123@example.com".as_bytes().to_vec(),
            "PasswordisPassword!".as_bytes().to_vec(),
        );
        assert_eq!(
            wire_string(&cmd),
            "AUTH PLAIN AHRlc3RfdXNlcjEyM0BleGFtcGxlLmNvbQBQYXNzd29yZGlzUGFzc3dvcmQh\r\n"
        );
    }

    #[test]
    fn auth_plain_round_trips_through_base64() {
        let cmd = AuthPlainCommand::new(b"user".to_vec(), b"pass".to_vec());
        let wire = wire_string(&cmd);
        let b64_arg = wire
            .strip_prefix("AUTH PLAIN ")
            .and_then(|s| s.strip_suffix("\r\n"))
            .unwrap();
        let decoded = STANDARD.decode(b64_arg).unwrap();
        assert_eq!(decoded, b"\0user\0pass");
    }

    #[test]
    fn auth_plain_is_sensitive_and_redacted() {
        let cmd = AuthPlainCommand::new(b"u".to_vec(), b"p".to_vec());
        assert!(cmd.is_sensitive());
        assert_eq!(cmd.debug_data(), "AUTH PLAIN <redacted>");
    }

    #[test]
    fn auth_plain_cleanup_zeroes_credentials() {
        let mut cmd = AuthPlainCommand::new(b"user".to_vec(), b"pass".to_vec());
        cmd.cleanup();
        assert!(cmd.username.is_empty());
        assert!(cmd.password.is_empty());
    }

    #[test]
    fn auth_login_wire_format() {
        let cmd = AuthLoginCommand::new(b"user".to_vec(), b"pass".to_vec());
        assert_eq!(wire_string(&cmd), "AUTH LOGIN\r\n");
    }

    #[test]
    fn auth_login_two_round_continuation_sequence() {
        let mut cmd = AuthLoginCommand::new(b"user".to_vec(), b"pass".to_vec());
        let first = cmd
            .next_command_line_after_continuation(&continuation(334))
            .unwrap()
            .unwrap();
        assert_eq!(first, format!("{}\r\n", b64(b"user")).into_bytes());

        let second = cmd
            .next_command_line_after_continuation(&continuation(334))
            .unwrap()
            .unwrap();
        assert_eq!(second, format!("{}\r\n", b64(b"pass")).into_bytes());

        let err = cmd
            .next_command_line_after_continuation(&continuation(334))
            .unwrap_err();
        assert_eq!(err.failure_type(), FailureType::OperationNotSupportedForCommand);
    }

    #[test]
    fn auth_login_rejects_non_334_continuation() {
        let mut cmd = AuthLoginCommand::new(b"user".to_vec(), b"pass".to_vec());
        let err = cmd
            .next_command_line_after_continuation(&continuation(250))
            .unwrap_err();
        assert_eq!(err.failure_type(), FailureType::InvalidServerResponse);
    }

    #[test]
    fn xoauth2_wire_format_matches_sasl_layout() {
        let cmd = AuthXOAuth2Command::new(b"user@example.com".to_vec(), b"ya29.token".to_vec());
        let wire = wire_string(&cmd);
        let b64_arg = wire
            .strip_prefix("AUTH XOAUTH2 ")
            .and_then(|s| s.strip_suffix("\r\n"))
            .unwrap();
        let decoded = STANDARD.decode(b64_arg).unwrap();
        assert_eq!(decoded, b"user=user@example.com\x01auth=Bearer ya29.token\x01\x01");
    }

    #[test]
    fn xoauth2_continuation_aborts_with_empty_line() {
        let mut cmd = AuthXOAuth2Command::new(b"user".to_vec(), b"token".to_vec());
        let payload = cmd
            .next_command_line_after_continuation(&continuation(334))
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"\r\n");
    }
}
