//! `DATA`, buffered and streamed.
//!
//! Grounded on `mailledger-smtp`'s `Command::Data` serialize arm for the
//! initial `DATA\r\n` line. Dot-stuffing is the message producer's
//! responsibility, not this library's: both variants send whatever body
//! bytes they are given, followed by the `\r\n.\r\n` terminator.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::{zero_bytes, CommandChannel, CommandType};
use crate::command::SmtpCommand;
use crate::error::{Error, FailureType};
use crate::reply::ReplyLine;

const DATA_TERMINATOR: &[u8] = b"\r\n.\r\n";

/// `DATA` with the entire message body already materialised in memory.
#[derive(Debug, Clone)]
pub struct DataCommand {
    body: Vec<u8>,
}

impl DataCommand {
    /// Creates a buffered `DATA` command for an already dot-stuffed `body`.
    #[must_use]
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }
}

impl SmtpCommand for DataCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        b"DATA\r\n".to_vec()
    }

    fn command_type(&self) -> CommandType {
        CommandType::Data
    }

    fn debug_data(&self) -> String {
        "DATA".to_string()
    }

    fn next_command_line_after_continuation(
        &mut self,
        reply: &ReplyLine,
    ) -> Result<Option<Vec<u8>>, Error> {
        if reply.code != 354 {
            return Err(Error::new(FailureType::InvalidServerResponse)
                .with_detail(format!("expected 354 continuation for DATA, got {}", reply.code)));
        }
        let mut payload = self.body.clone();
        payload.extend_from_slice(DATA_TERMINATOR);
        Ok(Some(payload))
    }

    fn cleanup(&mut self) {
        zero_bytes(&mut self.body);
    }
}

/// `DATA` whose body is streamed from an `AsyncRead` source rather than
/// held in memory. Sensitive because message bodies may carry secrets the
/// caller does not want logged.
pub struct DataStreamCommand {
    source: Option<Box<dyn AsyncRead + Unpin + Send>>,
}

impl std::fmt::Debug for DataStreamCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStreamCommand")
            .field("source", &self.source.is_some().then_some("<stream>"))
            .finish()
    }
}

impl DataStreamCommand {
    /// Creates a streamed `DATA` command reading its body from `source`.
    #[must_use]
    pub fn new(source: impl AsyncRead + Unpin + Send + 'static) -> Self {
        Self {
            source: Some(Box::new(source)),
        }
    }
}

#[async_trait]
impl SmtpCommand for DataStreamCommand {
    fn command_line_bytes(&self) -> Vec<u8> {
        b"DATA\r\n".to_vec()
    }

    fn command_type(&self) -> CommandType {
        CommandType::Data
    }

    fn is_sensitive(&self) -> bool {
        true
    }

    fn debug_data(&self) -> String {
        "DATA stream".to_string()
    }

    fn expects_streamed_continuation(&self) -> bool {
        true
    }

    async fn encode_command_after_continuation(
        &mut self,
        channel: &mut CommandChannel,
        reply: &ReplyLine,
    ) -> Result<(), Error> {
        if reply.code != 354 {
            return Err(Error::new(FailureType::InvalidServerResponse)
                .with_detail(format!("expected 354 continuation for DATA, got {}", reply.code)));
        }
        let mut source = self.source.take().ok_or_else(|| {
            Error::new(FailureType::IllegalState)
                .with_detail("DATA stream already consumed")
        })?;

        let mut buf = vec![0_u8; 8192];
        loop {
            let n = source
                .read(&mut buf)
                .await
                .map_err(|e| Error::new(FailureType::WriteToServerFailed).with_cause(e))?;
            if n == 0 {
                break;
            }
            channel
                .write_all(&buf[..n])
                .await
                .map_err(|e| Error::new(FailureType::WriteToServerFailed).with_cause(e))?;
        }
        channel
            .write_all(DATA_TERMINATOR)
            .await
            .map_err(|e| Error::new(FailureType::WriteToServerFailed).with_cause(e))?;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.source = None;
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
    fn data_command_line_is_bare() {
        assert_eq!(wire_string(&DataCommand::new(Vec::new())), "DATA\r\n");
    }

    #[test]
    fn data_appends_terminator_after_354() {
        let mut cmd = DataCommand::new(b"Subject: hi\r\n\r\nbody".to_vec());
        let payload = cmd
            .next_command_line_after_continuation(&continuation(354))
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"Subject: hi\r\n\r\nbody\r\n.\r\n");
    }

    #[test]
    fn data_rejects_non_354_continuation() {
        let mut cmd = DataCommand::new(b"body".to_vec());
        let err = cmd
            .next_command_line_after_continuation(&continuation(250))
            .unwrap_err();
        assert_eq!(err.failure_type(), FailureType::InvalidServerResponse);
    }

    #[test]
    fn cleanup_zeroes_body() {
        let mut cmd = DataCommand::new(b"secret body".to_vec());
        cmd.cleanup();
        assert!(cmd.body.is_empty());
    }

    #[tokio::test]
    async fn streamed_data_writes_body_then_terminator() {
        let mut cmd = DataStreamCommand::new(std::io::Cursor::new(b"hello world".to_vec()));
        let mut sink = Vec::new();
        cmd.encode_command_after_continuation(&mut sink, &continuation(354))
            .await
            .unwrap();
        assert_eq!(sink, b"hello world\r\n.\r\n");
    }

    #[tokio::test]
    async fn streamed_data_rejects_non_354_continuation() {
        let mut cmd = DataStreamCommand::new(std::io::Cursor::new(b"x".to_vec()));
        let mut sink = Vec::new();
        let err = cmd
            .encode_command_after_continuation(&mut sink, &continuation(250))
            .await
            .unwrap_err();
        assert_eq!(err.failure_type(), FailureType::InvalidServerResponse);
    }

    #[test]
    fn streamed_data_is_sensitive_with_redacted_label() {
        let cmd = DataStreamCommand::new(std::io::Cursor::new(Vec::new()));
        assert!(cmd.is_sensitive());
        assert_eq!(cmd.debug_data(), "DATA stream");
    }
}
