//! Shared plumbing for the connect (4.E) and STARTTLS (4.F) handshakes.
//!
//! Both run before a [`crate::session::Session`] exists to dispatch into,
//! reading whole multi-line replies directly off a freshly split channel.
//! No teacher equivalent — `mailledger-smtp`'s `Client::from_stream`/
//! `Client::starttls` are synchronous await-chains with no separate framing
//! stage; this module exists so [`crate::connect`] and [`crate::starttls`]
//! don't each reimplement idle-timeout/EOF bookkeeping around
//! `FramedRead::next()`.

use std::time::Duration;

use futures::StreamExt;
use tokio::io::ReadHalf;
use tokio_util::codec::FramedRead;

use crate::error::{Error, FailureType};
use crate::framer::LineCodec;
use crate::reply::AggregatedReply;
use crate::transport::Channel;

/// A line-framed reader over one half of a not-yet-handed-off channel.
pub(crate) type HandshakeReader = FramedRead<ReadHalf<Box<dyn Channel>>, LineCodec>;

/// The failure types a handshake phase should raise for timeout/EOF/I-O
/// events; these differ between the connect handler and the STARTTLS
/// handler per spec 4.E/4.F even though the read loop itself is identical.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransientFailures {
    pub idle: FailureType,
    pub inactive: FailureType,
    pub exception: FailureType,
}

/// Reads lines until a terminal one arrives, aggregating them the same way
/// the session state machine does for an ordinary command reply.
///
/// # Errors
///
/// Returns `failures.idle` if `idle_timeout` elapses first, `failures
/// .inactive` on a clean EOF, and either a decode error (already typed, e.g.
/// [`FailureType::InvalidServerResponse`]) or `failures.exception` for a
/// lower-level I/O failure.
pub(crate) async fn read_reply(
    framed: &mut HandshakeReader,
    idle_timeout: Duration,
    failures: TransientFailures,
) -> Result<AggregatedReply, Error> {
    let mut lines = Vec::new();
    loop {
        match tokio::time::timeout(idle_timeout, framed.next()).await {
            Ok(Some(Ok(text))) => {
                let line = crate::reply::ReplyLine::parse(&text)?;
                let is_last = line.is_last;
                lines.push(line);
                if is_last {
                    return Ok(AggregatedReply::new(lines));
                }
            }
            // `FramedRead`'s `Decoder::Error: From<io::Error>` bound forces
            // a lower-level I/O failure through the same blanket
            // `ChannelException` conversion our own decode errors never
            // produce (they use `InvalidServerResponse`); remap only that
            // case to the phase-appropriate exception type.
            Ok(Some(Err(e))) if e.failure_type() == FailureType::ChannelException => {
                return Err(Error::new(failures.exception).with_detail(e.to_string()));
            }
            Ok(Some(Err(e))) => return Err(e),
            Ok(None) => return Err(Error::new(failures.inactive)),
            Err(_elapsed) => return Err(Error::new(failures.idle)),
        }
    }
}

/// Fails with [`FailureType::MoreInputThanExpected`] if the reader has
/// already buffered bytes beyond the reply just consumed. A well-behaved
/// server never pipelines past a handshake reply it hasn't been answered
/// yet, so any leftover would otherwise be silently dropped by
/// [`FramedRead::into_inner`] when the channel is handed off.
pub(crate) fn ensure_no_leftover(framed: &HandshakeReader) -> Result<(), Error> {
    if framed.read_buffer().is_empty() {
        Ok(())
    } else {
        Err(Error::new(FailureType::MoreInputThanExpected)
            .with_detail("server sent bytes beyond the expected handshake reply"))
    }
}
