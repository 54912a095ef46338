//! The per-command state machine driving one SMTP session.
//!
//! No direct teacher equivalent: `mailledger-smtp`'s `connection::client::
//! Client<State>` is a synchronous, compile-time type-state chain with no
//! concept of a long-lived reactor task or a cross-task result cell. Here a
//! single `tokio::task` owns the channel for the session's lifetime — "the
//! I/O reactor thread assigned to its channel" of spec 4.D is realized as
//! that task, which is the only code that ever reads or writes the channel,
//! so no locks are needed around the read/write sequencing itself. A small
//! amount of shared, atomically-updated state (`closed`, `in_flight`) lets
//! [`Session::execute`] perform its synchronous admission checks from
//! whatever task calls it, without round-tripping through the reactor task.
//!
//! A 3xx continuation line is consumed entirely by the triggering command
//! (it never appears in the [`AggregatedReply`] ultimately returned to the
//! caller) so that the "all codes share the same first digit" invariant
//! holds for every resolved reply: the lines accumulated so far are
//! discarded once a continuation is answered, and accumulation restarts for
//! the reply that follows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use crate::command::SmtpCommand;
use crate::error::{Error, FailureType};
use crate::framer::LineCodec;
use crate::future::SmtpFuture;
use crate::reply::{AggregatedReply, ReplyLine};
use crate::transport::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotSent,
    RequestSent,
}

struct InFlight {
    command: Box<dyn SmtpCommand>,
    phase: Phase,
    partial_reply: Vec<ReplyLine>,
    future: SmtpFuture<AggregatedReply>,
}

enum ReactorMsg {
    Write {
        bytes: Vec<u8>,
        command: Box<dyn SmtpCommand>,
        future: SmtpFuture<AggregatedReply>,
    },
    Close {
        future: SmtpFuture<bool>,
    },
}

struct Shared {
    session_id: u64,
    closed: AtomicBool,
    in_flight: AtomicBool,
    debug_mode: AtomicBool,
}

/// One SMTP conversation on one channel. Cheap to clone; clones share the
/// same underlying reactor task and admission state.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
    user_context: Option<String>,
    to_reactor: mpsc::UnboundedSender<ReactorMsg>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.shared.session_id)
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .field("in_flight", &self.shared.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

impl Session {
    /// Spawns the reactor task owning `channel` and returns the session
    /// handle. `initial_greeting`/STARTTLS handshakes have already
    /// completed by the time this is called; see [`crate::connect`] and
    /// [`crate::starttls`].
    pub(crate) fn spawn(
        channel: Box<dyn Channel>,
        session_id: u64,
        user_context: Option<String>,
        read_timeout: Duration,
        max_line: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            session_id,
            closed: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            debug_mode: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_reactor(
            channel,
            rx,
            Arc::clone(&shared),
            read_timeout,
            max_line,
        ));
        Self {
            shared,
            user_context,
            to_reactor: tx,
        }
    }

    /// The session's stable identifier, used in error and log context.
    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.shared.session_id
    }

    /// The application-supplied context string, if any.
    #[must_use]
    pub fn user_context(&self) -> Option<&str> {
        self.user_context.as_deref()
    }

    /// Enables or disables verbose wire-level logging for this session.
    pub fn set_debug_mode(&self, on: bool) {
        self.shared.debug_mode.store(on, Ordering::Relaxed);
    }

    /// `true` once the session has been closed (by the application, by the
    /// channel going inactive, or by a fatal protocol error).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Relaxed)
    }

    /// Sends `command` and returns a future resolving to its aggregated
    /// reply.
    ///
    /// # Errors
    ///
    /// Returns [`FailureType::OperationProhibitedOnClosedChannel`] if the
    /// session is closed, or [`FailureType::CommandNotAllowed`] if a
    /// command is already in flight. Neither check touches the channel.
    pub fn execute(
        &self,
        command: Box<dyn SmtpCommand>,
    ) -> Result<SmtpFuture<AggregatedReply>, Error> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::new(FailureType::OperationProhibitedOnClosedChannel)
                .with_session_id(self.shared.session_id));
        }
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(
                Error::new(FailureType::CommandNotAllowed).with_session_id(self.shared.session_id)
            );
        }

        let bytes = command.command_line_bytes();
        let future = SmtpFuture::new();
        let msg = ReactorMsg::Write {
            bytes,
            command,
            future: future.clone(),
        };
        if self.to_reactor.send(msg).is_err() {
            self.shared.in_flight.store(false, Ordering::SeqCst);
            self.shared.closed.store(true, Ordering::SeqCst);
            return Err(Error::new(FailureType::OperationProhibitedOnClosedChannel)
                .with_session_id(self.shared.session_id));
        }
        Ok(future)
    }

    /// Closes the session. Idempotent: closing an already-closed session
    /// resolves `true` immediately without touching the channel again.
    #[must_use]
    pub fn close(&self) -> SmtpFuture<bool> {
        let future = SmtpFuture::new();
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            future.done(Ok(true));
            return future;
        }
        let msg = ReactorMsg::Close {
            future: future.clone(),
        };
        if self.to_reactor.send(msg).is_err() {
            future.done(Ok(true));
        }
        future
    }
}

fn session_error(shared: &Shared, failure_type: FailureType) -> Error {
    Error::new(failure_type).with_session_id(shared.session_id)
}

async fn run_reactor(
    channel: Box<dyn Channel>,
    mut rx: mpsc::UnboundedReceiver<ReactorMsg>,
    shared: Arc<Shared>,
    read_timeout: Duration,
    max_line: usize,
) {
    let (read_half, mut write_half) = tokio::io::split(channel);
    let mut framed = FramedRead::new(read_half, LineCodec::new(max_line));
    let mut in_flight: Option<InFlight> = None;

    loop {
        tokio::select! {
            biased;

            msg = rx.recv() => {
                match msg {
                    Some(ReactorMsg::Write { bytes, mut command, future }) => {
                        match write_half.write_all(&bytes).await {
                            Ok(()) => {
                                if shared.debug_mode.load(Ordering::Relaxed) {
                                    tracing::debug!(
                                        session_id = shared.session_id,
                                        command = %command.debug_data(),
                                        "sent command"
                                    );
                                }
                                in_flight = Some(InFlight {
                                    command,
                                    phase: Phase::RequestSent,
                                    partial_reply: Vec::new(),
                                    future,
                                });
                            }
                            Err(e) => {
                                command.cleanup();
                                shared.in_flight.store(false, Ordering::SeqCst);
                                future.done(Err(
                                    session_error(&shared, FailureType::ChannelException)
                                        .with_cause(e),
                                ));
                                shared.closed.store(true, Ordering::SeqCst);
                                let _ = write_half.shutdown().await;
                                break;
                            }
                        }
                    }
                    Some(ReactorMsg::Close { future }) => {
                        shared.closed.store(true, Ordering::SeqCst);
                        let result = write_half.shutdown().await;
                        if let Some(pending) = in_flight.take() {
                            pending.future.done(Err(session_error(
                                &shared,
                                FailureType::ChannelDisconnected,
                            )));
                            shared.in_flight.store(false, Ordering::SeqCst);
                        }
                        match result {
                            Ok(()) => future.done(Ok(true)),
                            Err(e) => future.done(Err(session_error(
                                &shared,
                                FailureType::ClosingConnectionFailed,
                            ).with_cause(e))),
                        }
                        break;
                    }
                    None => {
                        shared.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }

            outcome = tokio::time::timeout(read_timeout, framed.next()) => {
                match outcome {
                    Ok(Some(Ok(text))) => {
                        if let Err(e) = handle_line(&text, &mut in_flight, &mut write_half, &shared).await {
                            if let Some(pending) = in_flight.take() {
                                pending.future.done(Err(e));
                                shared.in_flight.store(false, Ordering::SeqCst);
                            }
                            shared.closed.store(true, Ordering::SeqCst);
                            let _ = write_half.shutdown().await;
                            break;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        if let Some(pending) = in_flight.take() {
                            pending.future.done(Err(e));
                            shared.in_flight.store(false, Ordering::SeqCst);
                        }
                        shared.closed.store(true, Ordering::SeqCst);
                        let _ = write_half.shutdown().await;
                        break;
                    }
                    Ok(None) => {
                        if let Some(pending) = in_flight.take() {
                            pending.future.done(Err(session_error(
                                &shared,
                                FailureType::ChannelDisconnected,
                            )));
                            shared.in_flight.store(false, Ordering::SeqCst);
                        }
                        shared.closed.store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(_elapsed) => {
                        let should_fail = matches!(
                            &in_flight,
                            Some(f) if f.phase == Phase::RequestSent
                        );
                        if should_fail {
                            if let Some(pending) = in_flight.take() {
                                pending.future.done(Err(session_error(
                                    &shared,
                                    FailureType::ChannelTimeout,
                                )));
                                shared.in_flight.store(false, Ordering::SeqCst);
                            }
                            shared.closed.store(true, Ordering::SeqCst);
                            let _ = write_half.shutdown().await;
                            break;
                        }
                        // NOT_SENT or no in-flight command: idle stall is ignored.
                    }
                }
            }
        }
    }

    if let Some(mut pending) = in_flight.take() {
        pending.command.cleanup();
    }
}

async fn handle_line(
    text: &str,
    in_flight: &mut Option<InFlight>,
    write_half: &mut (impl tokio::io::AsyncWrite + Unpin + Send),
    shared: &Shared,
) -> Result<(), Error> {
    let line = ReplyLine::parse(text)?;

    let Some(current) = in_flight.as_mut() else {
        // Spurious reply after close or before any execute: drop it.
        return Ok(());
    };

    if shared.debug_mode.load(Ordering::Relaxed) {
        tracing::trace!(session_id = shared.session_id, reply = %text, "received reply line");
    }

    current.partial_reply.push(line.clone());

    if line.is_continuation() {
        if current.command.expects_streamed_continuation() {
            current
                .command
                .encode_command_after_continuation(write_half, &line)
                .await?;
            current.partial_reply.clear();
            return Ok(());
        }

        match current.command.next_command_line_after_continuation(&line) {
            Ok(Some(payload)) => {
                write_half
                    .write_all(&payload)
                    .await
                    .map_err(|e| Error::new(FailureType::WriteToServerFailed).with_cause(e))?;
                current.partial_reply.clear();
                Ok(())
            }
            Ok(None) => Err(Error::new(FailureType::WriteToServerFailed)
                .with_detail("command failed to produce a continuation payload")),
            Err(e) => Err(e),
        }
    } else if line.is_last {
        let lines = std::mem::take(&mut current.partial_reply);
        let aggregated = AggregatedReply::new(lines);
        let mut finished = in_flight.take().unwrap_or_else(|| unreachable!());
        finished.command.cleanup();
        shared.in_flight.store(false, Ordering::SeqCst);
        finished.future.done(Ok(aggregated));
        Ok(())
    } else {
        // Non-terminal, non-continuation line: keep buffering.
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::{EhloCommand, QuitCommand};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn spawn_session(read_timeout: Duration) -> (Session, DuplexStream) {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let session = Session::spawn(Box::new(client_side), 1, None, read_timeout, 4096);
        (session, server_side)
    }

    #[tokio::test]
    async fn execute_resolves_on_terminal_reply() {
        let (session, mut server) = spawn_session(Duration::from_secs(5));
        let future = session.execute(Box::new(EhloCommand::new("me"))).unwrap();

        let mut buf = [0_u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"EHLO me\r\n");

        server.write_all(b"250-host\r\n250 HELP\r\n").await.unwrap();
        let reply = future.get(Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply.code(), 250);
        assert!(reply.is_success());
        assert_eq!(reply.lines().len(), 2);
    }

    #[tokio::test]
    async fn execute_while_in_flight_fails_without_touching_channel() {
        let (session, mut server) = spawn_session(Duration::from_secs(5));
        let _first = session.execute(Box::new(EhloCommand::new("me"))).unwrap();

        let mut buf = [0_u8; 64];
        let _ = server.read(&mut buf).await.unwrap();

        let err = session
            .execute(Box::new(QuitCommand::new()))
            .unwrap_err();
        assert_eq!(err.failure_type(), FailureType::CommandNotAllowed);
    }

    #[tokio::test]
    async fn execute_on_closed_session_fails_synchronously() {
        let (session, _server) = spawn_session(Duration::from_secs(5));
        let closed = session.close();
        closed.get(Duration::from_secs(5)).await.unwrap();

        let err = session
            .execute(Box::new(QuitCommand::new()))
            .unwrap_err();
        assert_eq!(
            err.failure_type(),
            FailureType::OperationProhibitedOnClosedChannel
        );
    }

    #[tokio::test]
    async fn idle_timeout_mid_command_fails_future_and_closes_session() {
        let (session, _server) = spawn_session(Duration::from_millis(20));
        let future = session.execute(Box::new(QuitCommand::new())).unwrap();

        let err = future.get(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.failure_type(), FailureType::ChannelTimeout);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let err = session
            .execute(Box::new(QuitCommand::new()))
            .unwrap_err();
        assert_eq!(
            err.failure_type(),
            FailureType::OperationProhibitedOnClosedChannel
        );
    }

    #[tokio::test]
    async fn channel_inactive_fails_in_flight_with_disconnected() {
        let (session, server) = spawn_session(Duration::from_secs(5));
        let future = session.execute(Box::new(QuitCommand::new())).unwrap();
        drop(server);

        let err = future.get(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.failure_type(), FailureType::ChannelDisconnected);
    }

    #[tokio::test]
    async fn closing_an_already_closed_session_resolves_true() {
        let (session, _server) = spawn_session(Duration::from_secs(5));
        assert!(session.close().get(Duration::from_secs(5)).await.unwrap());
        assert!(session.close().get(Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn auth_login_continuation_lines_never_mix_classes_in_final_reply() {
        use crate::command::AuthLoginCommand;

        let (session, mut server) = spawn_session(Duration::from_secs(5));
        let future = session
            .execute(Box::new(AuthLoginCommand::new(
                b"user".to_vec(),
                b"pass".to_vec(),
            )))
            .unwrap();

        let mut buf = [0_u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"AUTH LOGIN\r\n");

        server.write_all(b"334 VXNlcm5hbWU6\r\n").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        assert!(buf[..n].ends_with(b"\r\n"));

        server.write_all(b"334 UGFzc3dvcmQ6\r\n").await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        assert!(buf[..n].ends_with(b"\r\n"));

        server.write_all(b"235 ok\r\n").await.unwrap();
        let reply = future.get(Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply.lines().len(), 1);
        assert_eq!(reply.code(), 235);
    }
}
