//! # reactor-smtp
//!
//! An asynchronous, event-driven SMTP client library: non-blocking,
//! per-session state machines over a duplex byte stream, with optional
//! STARTTLS upgrade and pipelined per-session bookkeeping.
//!
//! ## Scope
//!
//! This crate opens one SMTP session at a time per connection and executes
//! one command at a time per session; it does not do connection pooling,
//! retries, DNS/MX resolution, or SASL mechanisms beyond PLAIN/LOGIN/
//! XOAUTH2, and it implements no server role. TCP/TLS acquisition is
//! abstracted behind [`transport::Transport`] and
//! [`transport::SslContextFactory`] so applications can substitute their
//! own (a default Tokio/rustls implementation is provided).
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use reactor_smtp::client::{Client, ClientConfig, SessionData};
//! use reactor_smtp::command::{EhloCommand, QuitCommand};
//!
//! # async fn run() -> reactor_smtp::error::Result<()> {
//! let client = Client::default();
//! let created = client
//!     .create_session(
//!         SessionData::new("smtp.example.com", 587),
//!         ClientConfig::default(),
//!     )
//!     .get(Duration::from_secs(30))
//!     .await?;
//!
//! let reply = created
//!     .session
//!     .execute(Box::new(EhloCommand::new("client.example.com")))?
//!     .get(Duration::from_secs(30))
//!     .await?;
//! assert!(reply.is_success());
//!
//! created
//!     .session
//!     .execute(Box::new(QuitCommand::new()))?
//!     .get(Duration::from_secs(30))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module map
//!
//! - [`client`]: the facade applications call to open a session
//!   ([`client::Client`], [`client::SessionData`], [`client::ClientConfig`]).
//! - [`session`]: the per-command state machine driving one SMTP
//!   conversation ([`session::Session`]).
//! - [`command`]: the polymorphic command objects `Session::execute` takes.
//! - [`reply`]: reply-line parsing and aggregation.
//! - [`transport`]: the `Transport`/`SslContextFactory`/`SslHandshaker`
//!   collaborator traits, plus default Tokio/rustls implementations.
//! - [`future`]: the single-assignment result cell used for both the
//!   session-creation future and per-command futures.
//! - [`error`]: the stable `FailureType` discriminant and `Error` type.
//! - [`types`]: envelope address and EHLO-extension value types.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod command;
mod connect;
pub mod error;
mod framer;
pub mod future;
mod handshake;
pub mod reply;
pub mod session;
mod starttls;
pub mod transport;
pub mod types;

pub use client::{Client, ClientConfig, SessionCreated, SessionData};
pub use error::{Error, FailureType, Result};
pub use future::SmtpFuture;
pub use reply::{AggregatedReply, ReplyClass, ReplyLine};
pub use session::Session;
pub use types::{Address, AuthMechanism, Extension};
