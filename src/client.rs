//! Client facade (spec 4.G): accepts a connection request, opens the
//! transport, and drives either the connect or STARTTLS handshake to
//! produce a [`Session`].
//!
//! Grounded on `mailledger-smtp`'s top-level `connection::connect`/
//! `connect_tls` functions for the transport-acquisition half, generalized
//! to also wire up the handshake described in 4.E/4.F behind one entry
//! point, in the style of the teacher's `OutgoingMessage` builder
//! (`mailledger-core/src/service/mail.rs`) for `SessionData`/`ClientConfig`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connect;
use crate::error::{Error, FailureType};
use crate::future::SmtpFuture;
use crate::reply::AggregatedReply;
use crate::session::Session;
use crate::starttls;
use crate::transport::{SslContextFactory, TcpTransport, Transport};

/// Published on the creation future once the connect/STARTTLS handshake
/// succeeds.
#[derive(Debug, Clone)]
pub struct SessionCreated {
    /// The newly created, ready-to-use session.
    pub session: Session,
    /// The server's greeting, or (after a STARTTLS upgrade) its final
    /// `220` response to the `STARTTLS` command.
    pub greeting: AggregatedReply,
}

/// Per-connection configuration not specific to one target server.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// How long to wait for inbound bytes before failing with a timeout.
    pub read_timeout: Duration,
    /// Maximum line length the line framer accepts before failing the
    /// session with [`FailureType::InvalidServerResponse`].
    pub max_line_length: usize,
}

impl ClientConfig {
    /// Creates a config with an explicit `read_timeout` and
    /// `max_line_length`.
    #[must_use]
    pub const fn new(read_timeout: Duration, max_line_length: usize) -> Self {
        Self {
            read_timeout,
            max_line_length,
        }
    }

    /// Returns a copy with `read_timeout` replaced.
    #[must_use]
    pub const fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Returns a copy with `max_line_length` replaced.
    #[must_use]
    pub const fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(300),
            max_line_length: 8192,
        }
    }
}

/// A single session's target and the upgrade/identity parameters needed to
/// reach it.
#[derive(Debug, Clone)]
pub struct SessionData {
    /// The remote host to connect to; also the default TLS verification
    /// name and SNI name when `sni_names` is empty.
    pub host: String,
    /// The remote TCP port.
    pub port: u16,
    /// Explicit SNI names to present during a TLS handshake.
    pub sni_names: Vec<String>,
    /// Application-supplied context string attached to the session and
    /// echoed in error/log output.
    pub session_context: Option<String>,
    /// Builds the TLS handshaker used for implicit TLS or STARTTLS.
    /// Required when `use_starttls` is `true`; when `use_starttls` is
    /// `false` and this is `Some`, the connection is TLS from the first
    /// byte (implicit TLS, e.g. port 465).
    pub ssl_context: Option<Arc<dyn SslContextFactory>>,
    /// Whether to negotiate a STARTTLS upgrade after the plaintext
    /// greeting, per spec 4.F.
    pub use_starttls: bool,
    /// The name this client presents in `EHLO` when negotiating STARTTLS.
    pub client_name: String,
}

impl SessionData {
    /// Creates session data for a plaintext (no TLS, no STARTTLS)
    /// connection to `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            sni_names: Vec::new(),
            session_context: None,
            ssl_context: None,
            use_starttls: false,
            client_name: "localhost".to_string(),
        }
    }

    /// Configures implicit TLS: the connection is wrapped in TLS before the
    /// greeting is read, with no `STARTTLS` negotiation.
    #[must_use]
    pub fn with_implicit_tls(mut self, ssl_context: Arc<dyn SslContextFactory>) -> Self {
        self.ssl_context = Some(ssl_context);
        self.use_starttls = false;
        self
    }

    /// Requests a STARTTLS upgrade using `ssl_context`, identifying this
    /// client as `client_name` in `EHLO`.
    #[must_use]
    pub fn with_starttls(
        mut self,
        ssl_context: Arc<dyn SslContextFactory>,
        client_name: impl Into<String>,
    ) -> Self {
        self.ssl_context = Some(ssl_context);
        self.use_starttls = true;
        self.client_name = client_name.into();
        self
    }

    /// Overrides the SNI names presented during a TLS handshake.
    #[must_use]
    pub fn with_sni_names(mut self, sni_names: Vec<String>) -> Self {
        self.sni_names = sni_names;
        self
    }

    /// Attaches an application-supplied context string.
    #[must_use]
    pub fn with_session_context(mut self, session_context: impl Into<String>) -> Self {
        self.session_context = Some(session_context.into());
        self
    }
}

/// Opens connections and drives the connect/STARTTLS handshake to produce
/// [`Session`]s. Cheap to clone; every clone shares the same session-id
/// counter and transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    next_session_id: Arc<AtomicU64>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Arc::new(TcpTransport))
    }
}

impl Client {
    /// Creates a client that opens connections via `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Opens a connection to `session_data.host:session_data.port`,
    /// completes the server greeting (and STARTTLS upgrade, if requested),
    /// and returns a future resolving to the created [`SessionCreated`].
    ///
    /// The handshake itself runs on a spawned task; the caller observes its
    /// outcome only through the returned future, per spec 4.G ("the future
    /// is completed by whichever handler resolves the session's fate").
    #[must_use]
    pub fn create_session(
        &self,
        session_data: SessionData,
        config: ClientConfig,
    ) -> SmtpFuture<SessionCreated> {
        let future = SmtpFuture::new();
        let result_future = future.clone();
        let transport = Arc::clone(&self.transport);
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let outcome = connect_session(transport, session_id, session_data, config).await;
            result_future.done(outcome);
        });
        future
    }
}

async fn connect_session(
    transport: Arc<dyn Transport>,
    session_id: u64,
    session_data: SessionData,
    config: ClientConfig,
) -> Result<SessionCreated, Error> {
    let raw_channel = transport
        .connect(&session_data.host, session_data.port)
        .await?;

    if session_data.use_starttls {
        let ssl_context = session_data.ssl_context.as_ref().ok_or_else(|| {
            Error::new(FailureType::InvalidInput)
                .with_detail("use_starttls requires an ssl_context")
        })?;
        let connected = starttls::connect_starttls(
            raw_channel,
            &session_data.client_name,
            &session_data.host,
            &session_data.sni_names,
            ssl_context,
            session_id,
            session_data.session_context.clone(),
            config.read_timeout,
            config.max_line_length,
        )
        .await?;
        return Ok(SessionCreated {
            session: connected.session,
            greeting: connected.greeting,
        });
    }

    let channel = match &session_data.ssl_context {
        Some(ssl_context) => {
            let handshaker = ssl_context.handshaker(&session_data.host, &session_data.sni_names)?;
            handshaker.handshake(raw_channel).await?
        }
        None => raw_channel,
    };

    let connected = connect::connect_plain(
        channel,
        session_id,
        session_data.session_context.clone(),
        config.read_timeout,
        config.max_line_length,
    )
    .await?;
    Ok(SessionCreated {
        session: connected.session,
        greeting: connected.greeting,
    })
}
