//! Connect handler (spec 4.E): reads the server greeting and, absent a
//! STARTTLS request, hands straight off to [`Session::spawn`].
//!
//! Grounded on `mailledger-smtp`'s `Client::from_stream` (read the greeting,
//! construct a client), generalized into a standalone function that runs
//! ahead of `Session` construction rather than a `Client<Connected>`
//! type-state value, since this spec's handoff target is a session handle
//! driven by a reactor task, not a further await-chained method call.

use std::time::Duration;

use tokio_util::codec::FramedRead;

use crate::error::{Error, FailureType};
use crate::framer::LineCodec;
use crate::handshake::{ensure_no_leftover, read_reply, TransientFailures};
use crate::reply::AggregatedReply;
use crate::session::Session;
use crate::transport::Channel;

const GREETING_FAILURES: TransientFailures = TransientFailures {
    idle: FailureType::ConnectionFailedExceedIdleMax,
    inactive: FailureType::ConnectionInactive,
    exception: FailureType::ConnectionFailedException,
};

/// The outcome of a successful connect (or STARTTLS) handshake: a ready
/// [`Session`] plus the reply that authorized its creation.
pub(crate) struct Connected {
    pub session: Session,
    pub greeting: AggregatedReply,
}

/// Runs the plain (non-STARTTLS) connect handshake over `channel`.
///
/// # Errors
///
/// Returns [`FailureType::ConnectionFailedInvalidGreetingCode`] if the
/// greeting's terminal code is not `220`, and the idle/inactive/exception
/// variants documented on [`crate::handshake::read_reply`] for transient
/// failures before the greeting arrives.
pub(crate) async fn connect_plain(
    channel: Box<dyn Channel>,
    session_id: u64,
    user_context: Option<String>,
    read_timeout: Duration,
    max_line: usize,
) -> Result<Connected, Error> {
    let (read_half, write_half) = tokio::io::split(channel);
    let mut framed = FramedRead::new(read_half, LineCodec::new(max_line));

    let greeting = read_reply(&mut framed, read_timeout, GREETING_FAILURES).await?;
    if greeting.code() != 220 {
        return Err(Error::new(FailureType::ConnectionFailedInvalidGreetingCode)
            .with_session_id(session_id)
            .with_detail(format!("greeting code was {}", greeting.code())));
    }

    ensure_no_leftover(&framed)?;
    let read_half = framed.into_inner();
    let channel = Box::new(tokio::io::join(read_half, write_half)) as Box<dyn Channel>;

    let session = Session::spawn(channel, session_id, user_context, read_timeout, max_line);
    Ok(Connected { session, greeting })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn greeting_220_creates_session() {
        let (client_side, mut server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(connect_plain(
            Box::new(client_side),
            1,
            None,
            Duration::from_secs(5),
            4096,
        ));
        server.write_all(b"220 mail.example.com ready\r\n").await.unwrap();
        let connected = handle.await.unwrap().unwrap();
        assert_eq!(connected.greeting.code(), 220);
        assert!(!connected.session.is_closed());
    }

    #[tokio::test]
    async fn multi_line_greeting_is_aggregated() {
        let (client_side, mut server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(connect_plain(
            Box::new(client_side),
            1,
            None,
            Duration::from_secs(5),
            4096,
        ));
        server
            .write_all(b"220-mail.example.com\r\n220 ESMTP ready\r\n")
            .await
            .unwrap();
        let connected = handle.await.unwrap().unwrap();
        assert_eq!(connected.greeting.lines().len(), 2);
    }

    #[tokio::test]
    async fn non_220_greeting_fails_creation() {
        let (client_side, mut server) = tokio::io::duplex(4096);
        let handle = tokio::spawn(connect_plain(
            Box::new(client_side),
            1,
            None,
            Duration::from_secs(5),
            4096,
        ));
        server.write_all(b"554 no service\r\n").await.unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.failure_type(), FailureType::ConnectionFailedInvalidGreetingCode);
    }

    #[tokio::test]
    async fn idle_before_greeting_fails_with_exceed_idle_max() {
        let (client_side, _server) = tokio::io::duplex(4096);
        let err = connect_plain(
            Box::new(client_side),
            1,
            None,
            Duration::from_millis(20),
            4096,
        )
        .await
        .unwrap_err();
        assert_eq!(err.failure_type(), FailureType::ConnectionFailedExceedIdleMax);
    }

    #[tokio::test]
    async fn channel_inactive_before_greeting_fails_with_connection_inactive() {
        let (client_side, server) = tokio::io::duplex(4096);
        drop(server);
        let err = connect_plain(
            Box::new(client_side),
            1,
            None,
            Duration::from_secs(5),
            4096,
        )
        .await
        .unwrap_err();
        assert_eq!(err.failure_type(), FailureType::ConnectionInactive);
    }
}
