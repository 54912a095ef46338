//! STARTTLS handler (spec 4.F): greeting → EHLO → capability-gated
//! `STARTTLS` → TLS handshake → [`Session`].
//!
//! Grounded on `mailledger-smtp`'s `Client::starttls` (EHLO → STARTTLS →
//! TLS upgrade → re-EHLO), generalized into a standalone state machine that
//! gates on the EHLO `STARTTLS` capability line before issuing `STARTTLS`
//! (the teacher's `starttls()` does not gate on this; it was added per
//! spec 4.F, the four-step flow adopted as authoritative over the source's
//! simpler two-step variant).

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::codec::FramedRead;

use crate::connect::Connected;
use crate::error::{Error, FailureType};
use crate::framer::LineCodec;
use crate::handshake::{ensure_no_leftover, read_reply, TransientFailures};
use crate::reply::ReplyClass;
use crate::session::Session;
use crate::transport::{Channel, SslContextFactory};
use crate::types::Extension;

const TRANSIENT_FAILURES: TransientFailures = TransientFailures {
    idle: FailureType::ChannelTimeout,
    inactive: FailureType::ChannelInactive,
    exception: FailureType::ChannelException,
};

/// Runs the four-step STARTTLS handshake over `channel`, upgrading it to
/// TLS before a [`Session`] is created.
///
/// # Errors
///
/// Returns [`FailureType::ConnectionFailedInvalidGreetingCode`] if the
/// greeting is not `220`, [`FailureType::BadEhloResponse`] if the EHLO
/// reply is not a positive completion, [`FailureType::NoStarttlsCapability`]
/// if it lacks a `STARTTLS` capability line, [`FailureType::BadStarttlsResponse`]
/// if the `STARTTLS` reply is not `220`, [`FailureType::SslContextException`]
/// if the handshaker cannot be built, and
/// [`FailureType::ConnectionFailedException`] if the TLS handshake itself
/// fails. Idle/EOF/I-O events at any step fail with
/// [`FailureType::ChannelTimeout`] / [`FailureType::ChannelInactive`] /
/// [`FailureType::ChannelException`] respectively.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn connect_starttls(
    channel: Box<dyn Channel>,
    client_name: &str,
    host: &str,
    sni_names: &[String],
    ssl_context: &Arc<dyn SslContextFactory>,
    session_id: u64,
    user_context: Option<String>,
    read_timeout: Duration,
    max_line: usize,
) -> Result<Connected, Error> {
    let (read_half, mut write_half) = tokio::io::split(channel);
    let mut framed = FramedRead::new(read_half, LineCodec::new(max_line));

    // State 1: GET_SERVER_GREETING.
    let greeting = read_reply(&mut framed, read_timeout, TRANSIENT_FAILURES).await?;
    if greeting.code() != 220 {
        return Err(Error::new(FailureType::ConnectionFailedInvalidGreetingCode)
            .with_session_id(session_id)
            .with_detail(format!("greeting code was {}", greeting.code())));
    }

    write_half
        .write_all(format!("EHLO {client_name}\r\n").as_bytes())
        .await
        .map_err(|e| Error::new(FailureType::ChannelException).with_cause(e))?;

    // State 2: GET_EHLO_RESP.
    let ehlo_reply = read_reply(&mut framed, read_timeout, TRANSIENT_FAILURES).await?;
    if ehlo_reply.class() != ReplyClass::PositiveCompletion {
        return Err(Error::new(FailureType::BadEhloResponse)
            .with_session_id(session_id)
            .with_detail(format!("EHLO reply code was {}", ehlo_reply.code())));
    }
    let saw_starttls_capability = ehlo_reply
        .lines()
        .iter()
        .any(|line| Extension::parse(line.message.trim()) == Extension::StartTls);
    if !saw_starttls_capability {
        return Err(Error::new(FailureType::NoStarttlsCapability).with_session_id(session_id));
    }

    write_half
        .write_all(b"STARTTLS\r\n")
        .await
        .map_err(|e| Error::new(FailureType::ChannelException).with_cause(e))?;

    // State 3: GET_STARTTLS_RESP.
    let starttls_reply = read_reply(&mut framed, read_timeout, TRANSIENT_FAILURES).await?;
    if starttls_reply.code() != 220 {
        return Err(Error::new(FailureType::BadStarttlsResponse)
            .with_session_id(session_id)
            .with_detail(format!("STARTTLS reply code was {}", starttls_reply.code())));
    }

    ensure_no_leftover(&framed)?;
    let read_half = framed.into_inner();
    let plaintext = Box::new(tokio::io::join(read_half, write_half)) as Box<dyn Channel>;

    let handshaker = ssl_context.handshaker(host, sni_names)?;

    // State 4: TLS handshake.
    let tls_channel = handshaker.handshake(plaintext).await?;

    let session = Session::spawn(tls_channel, session_id, user_context, read_timeout, max_line);
    Ok(Connected {
        session,
        greeting: starttls_reply,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;

    struct PassthroughHandshaker;

    #[async_trait]
    impl crate::transport::SslHandshaker for PassthroughHandshaker {
        async fn handshake(self: Box<Self>, channel: Box<dyn Channel>) -> Result<Box<dyn Channel>, Error> {
            Ok(channel)
        }
    }

    struct StubSslContext;

    impl SslContextFactory for StubSslContext {
        fn handshaker(
            &self,
            _host: &str,
            _sni_names: &[String],
        ) -> Result<Box<dyn crate::transport::SslHandshaker>, Error> {
            Ok(Box::new(PassthroughHandshaker))
        }
    }

    struct FailingSslContext;

    impl SslContextFactory for FailingSslContext {
        fn handshaker(
            &self,
            _host: &str,
            _sni_names: &[String],
        ) -> Result<Box<dyn crate::transport::SslHandshaker>, Error> {
            Err(Error::new(FailureType::SslContextException))
        }
    }

    async fn drive_scenario(
        server_script: impl FnOnce(tokio::io::DuplexStream) -> tokio::task::JoinHandle<Vec<u8>>,
        ssl_context: Arc<dyn SslContextFactory>,
    ) -> Result<Connected, Error> {
        let (client_side, server) = tokio::io::duplex(4096);
        let server_task = server_script(server);
        let result = connect_starttls(
            Box::new(client_side),
            "Reconnection",
            "smtp.example.com",
            &[],
            &ssl_context,
            1,
            None,
            Duration::from_secs(5),
            4096,
        )
        .await;
        let _ = server_task.await;
        result
    }

    #[tokio::test]
    async fn full_upgrade_succeeds_when_capability_present() {
        let result = drive_scenario(
            |mut server| {
                tokio::spawn(async move {
                    let mut buf = [0_u8; 256];
                    server.write_all(b"220 ready\r\n").await.unwrap();
                    let n = server.read(&mut buf).await.unwrap();
                    assert_eq!(&buf[..n], b"EHLO Reconnection\r\n");
                    server
                        .write_all(b"250-host\r\n250 STARTTLS\r\n")
                        .await
                        .unwrap();
                    let n = server.read(&mut buf).await.unwrap();
                    assert_eq!(&buf[..n], b"STARTTLS\r\n");
                    server.write_all(b"220 go ahead\r\n").await.unwrap();
                    Vec::new()
                })
            },
            Arc::new(StubSslContext),
        )
        .await
        .unwrap();

        assert_eq!(result.greeting.code(), 220);
        assert!(!result.session.is_closed());
    }

    #[tokio::test]
    async fn missing_starttls_capability_fails_creation() {
        let err = drive_scenario(
            |mut server| {
                tokio::spawn(async move {
                    let mut buf = [0_u8; 256];
                    server.write_all(b"220 ready\r\n").await.unwrap();
                    let _ = server.read(&mut buf).await.unwrap();
                    server
                        .write_all(b"250-host\r\n250 SIZE 10240\r\n")
                        .await
                        .unwrap();
                    Vec::new()
                })
            },
            Arc::new(StubSslContext),
        )
        .await
        .unwrap_err();

        assert_eq!(err.failure_type(), FailureType::NoStarttlsCapability);
    }

    #[tokio::test]
    async fn non_220_greeting_fails_before_ehlo() {
        let err = drive_scenario(
            |mut server| {
                tokio::spawn(async move {
                    server.write_all(b"554 go away\r\n").await.unwrap();
                    Vec::new()
                })
            },
            Arc::new(StubSslContext),
        )
        .await
        .unwrap_err();

        assert_eq!(err.failure_type(), FailureType::ConnectionFailedInvalidGreetingCode);
    }

    #[tokio::test]
    async fn non_positive_ehlo_reply_fails_with_bad_ehlo_response() {
        let err = drive_scenario(
            |mut server| {
                tokio::spawn(async move {
                    let mut buf = [0_u8; 256];
                    server.write_all(b"220 ready\r\n").await.unwrap();
                    let _ = server.read(&mut buf).await.unwrap();
                    server.write_all(b"451 temporary failure\r\n").await.unwrap();
                    Vec::new()
                })
            },
            Arc::new(StubSslContext),
        )
        .await
        .unwrap_err();

        assert_eq!(err.failure_type(), FailureType::BadEhloResponse);
    }

    #[tokio::test]
    async fn non_220_starttls_reply_fails_with_bad_starttls_response() {
        let err = drive_scenario(
            |mut server| {
                tokio::spawn(async move {
                    let mut buf = [0_u8; 256];
                    server.write_all(b"220 ready\r\n").await.unwrap();
                    let _ = server.read(&mut buf).await.unwrap();
                    server
                        .write_all(b"250-host\r\n250 STARTTLS\r\n")
                        .await
                        .unwrap();
                    let _ = server.read(&mut buf).await.unwrap();
                    server.write_all(b"454 TLS unavailable\r\n").await.unwrap();
                    Vec::new()
                })
            },
            Arc::new(StubSslContext),
        )
        .await
        .unwrap_err();

        assert_eq!(err.failure_type(), FailureType::BadStarttlsResponse);
    }

    #[tokio::test]
    async fn ssl_context_construction_failure_surfaces_directly() {
        let err = drive_scenario(
            |mut server| {
                tokio::spawn(async move {
                    let mut buf = [0_u8; 256];
                    server.write_all(b"220 ready\r\n").await.unwrap();
                    let _ = server.read(&mut buf).await.unwrap();
                    server
                        .write_all(b"250-host\r\n250 STARTTLS\r\n")
                        .await
                        .unwrap();
                    let _ = server.read(&mut buf).await.unwrap();
                    server.write_all(b"220 go ahead\r\n").await.unwrap();
                    Vec::new()
                })
            },
            Arc::new(FailingSslContext),
        )
        .await
        .unwrap_err();

        assert_eq!(err.failure_type(), FailureType::SslContextException);
    }
}
