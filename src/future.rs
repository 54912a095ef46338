//! Single-assignment, cancellable, thread-safe result cell.
//!
//! No teacher module is directly analogous — `mailledger-smtp` is
//! synchronous await-chained, so every `Client<State>` method simply
//! returns its `Result` and has nothing resembling a cross-thread, multi-
//! listener promise. This primitive is built from `tokio::sync::watch` +
//! `std::sync::Mutex`: the payload lives behind the mutex, and a `watch`
//! channel carries a generation counter used purely as a wakeup signal.
//! `watch::Receiver::changed()` compares version numbers rather than
//! queueing a notification, so a `done()` that races ahead of a waiter's
//! `changed().await` is never lost the way `Notify::notify_waiters()` can
//! lose a waiter that has not yet polled.
//!
//! `get(timeout)` is an `async fn` racing the cell's signal against
//! `tokio::time::sleep` — the idiomatic-Rust rendering of "blocks until a
//! terminal state or the timeout elapses" inside a Tokio-exclusive crate.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Error, FailureType};

enum Outcome<T> {
    Pending,
    Done(Result<T, Error>),
    Cancelled,
}

struct Inner<T> {
    outcome: Mutex<Outcome<T>>,
    signal_tx: watch::Sender<u64>,
    // Kept alive so `signal_tx.send` never fails with "no receivers".
    _signal_rx: watch::Receiver<u64>,
}

/// A single-assignment future: `done()` (success or failure) and `cancel()`
/// both race to decide the outcome, but only the first call has any effect.
pub struct SmtpFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SmtpFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SmtpFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.outcome.lock().unwrap_or_else(|e| e.into_inner()) {
            Outcome::Pending => "Pending",
            Outcome::Done(Ok(_)) => "Done(Ok)",
            Outcome::Done(Err(_)) => "Done(Err)",
            Outcome::Cancelled => "Cancelled",
        };
        f.debug_struct("SmtpFuture").field("state", &state).finish()
    }
}

impl<T> Default for SmtpFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SmtpFuture<T> {
    /// Creates a new, pending future.
    #[must_use]
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = watch::channel(0_u64);
        Self {
            inner: Arc::new(Inner {
                outcome: Mutex::new(Outcome::Pending),
                signal_tx,
                _signal_rx: signal_rx,
            }),
        }
    }

    /// Completes the future with a value or error. Idempotent: only the
    /// first call (whether `done` or `cancel`) has any effect.
    pub fn done(&self, result: Result<T, Error>) {
        let mut outcome = self.inner.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*outcome, Outcome::Pending) {
            *outcome = Outcome::Done(result);
            drop(outcome);
            self.inner.signal_tx.send_modify(|gen| *gen = gen.wrapping_add(1));
        }
    }

    /// Transitions `Pending -> Cancelled`. A no-op if already terminal.
    pub fn cancel(&self) {
        let mut outcome = self.inner.outcome.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*outcome, Outcome::Pending) {
            *outcome = Outcome::Cancelled;
            drop(outcome);
            self.inner.signal_tx.send_modify(|gen| *gen = gen.wrapping_add(1));
        }
    }

    /// `true` once `done` or `cancel` has taken effect.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            *self.inner.outcome.lock().unwrap_or_else(|e| e.into_inner()),
            Outcome::Pending
        )
    }

    /// Waits for a terminal state, or for `timeout` to elapse first.
    ///
    /// # Errors
    ///
    /// Returns the stored error if the future completed with one, a
    /// [`FailureType::IllegalState`] error if the future was cancelled, or a
    /// [`FailureType::ChannelTimeout`] error if `timeout` elapses first.
    pub async fn get(&self, timeout: Duration) -> Result<T, Error>
    where
        T: Clone,
    {
        tokio::time::timeout(timeout, self.wait_forever())
            .await
            .unwrap_or_else(|_| {
                Err(Error::new(FailureType::ChannelTimeout)
                    .with_detail("timed out waiting for future to complete"))
            })
    }

    fn poll_terminal(&self) -> Option<Result<T, Error>>
    where
        T: Clone,
    {
        match &*self.inner.outcome.lock().unwrap_or_else(|e| e.into_inner()) {
            Outcome::Pending => None,
            Outcome::Done(Ok(v)) => Some(Ok(v.clone())),
            Outcome::Done(Err(e)) => Some(Err(clone_error(e))),
            Outcome::Cancelled => Some(Err(Error::new(FailureType::IllegalState)
                .with_detail("future was cancelled"))),
        }
    }

    /// Registers a listener invoked once the future reaches a terminal
    /// state. If already terminal, invokes `cb` immediately.
    pub fn add_listener<F>(&self, cb: F)
    where
        T: Clone + Send + 'static,
        F: FnOnce(Result<T, Error>) + Send + 'static,
    {
        if let Some(result) = self.poll_terminal() {
            cb(result);
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.wait_forever().await;
            cb(result);
        });
    }

    async fn wait_forever(&self) -> Result<T, Error>
    where
        T: Clone,
    {
        let mut rx = self.inner.signal_tx.subscribe();
        loop {
            if let Some(result) = self.poll_terminal() {
                return result;
            }
            // `changed()` compares generation numbers, so a `done()` that
            // ran between our `poll_terminal` check above and this await
            // is still observed instead of being missed.
            if rx.changed().await.is_err() {
                // Sender dropped without a terminal outcome: treat as
                // cancelled rather than hanging forever.
                return Err(Error::new(FailureType::IllegalState)
                    .with_detail("future cell dropped without a result"));
            }
        }
    }
}

fn clone_error(e: &Error) -> Error {
    let mut cloned = Error::new(e.failure_type());
    if let Some(sid) = e.session_id() {
        cloned = cloned.with_session_id(sid);
    }
    cloned.with_detail(e.to_string())
}
