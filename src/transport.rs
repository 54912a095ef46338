//! Transport acquisition and TLS upgrade collaborators.
//!
//! Grounded on `mailledger-smtp`'s `connection::stream::{SmtpStream, connect,
//! connect_tls, create_tls_connector}`, generalized behind traits: the spec
//! treats the transport and the SSL context factory as external
//! collaborators the [`crate::client::Client`] facade is merely wired to,
//! not a concrete enum the library owns outright. This also lets tests
//! substitute an in-memory `tokio::io::duplex` channel for a real
//! `TcpStream`.

use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::{Error, FailureType};

/// A bidirectional, owned byte channel: a TCP socket, a TLS stream, or an
/// in-memory duplex half in tests.
pub trait Channel: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Channel for T {}

/// Opens the TCP connection to an SMTP server. The default implementation
/// wraps `tokio::net::TcpStream::connect`; DNS/MX resolution and pooling are
/// out of scope (the caller resolves `host` to a connectable name or
/// address before calling in).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`FailureType::ConnectionFailedException`] if the TCP
    /// connection cannot be established.
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Channel>, Error>;
}

/// Default [`Transport`] backed by `tokio::net::TcpStream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Channel>, Error> {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| {
            Error::new(FailureType::ConnectionFailedException).with_cause(e)
        })?;
        Ok(Box::new(stream))
    }
}

/// Performs a TLS handshake over an already-open channel, producing a new
/// channel that layers encryption over it. Constructed by an
/// [`SslContextFactory`] once the STARTTLS handler (or implicit-TLS setup)
/// decides a handshake is needed.
#[async_trait]
pub trait SslHandshaker: Send {
    /// Runs the handshake, consuming the plaintext channel.
    ///
    /// # Errors
    ///
    /// Returns [`FailureType::ConnectionFailedException`] if the handshake
    /// fails.
    async fn handshake(self: Box<Self>, channel: Box<dyn Channel>) -> Result<Box<dyn Channel>, Error>;
}

/// Builds an [`SslHandshaker`] for a given host, port, and SNI name set.
/// Grounded on `mailledger-smtp::connection::stream::create_tls_connector`,
/// generalized so the STARTTLS handler can request a handshaker at runtime
/// (spec 4.F step 3) rather than the teacher's compile-time
/// `upgrade_to_tls`.
pub trait SslContextFactory: Send + Sync {
    /// Builds a handshaker bound to `host` (used both for certificate
    /// verification and, when `sni_names` is empty, as the SNI name).
    ///
    /// # Errors
    ///
    /// Returns [`FailureType::SslContextException`] if the context or SNI
    /// name cannot be constructed.
    fn handshaker(
        &self,
        host: &str,
        sni_names: &[String],
    ) -> Result<Box<dyn SslHandshaker>, Error>;
}

/// Default [`SslContextFactory`] using `rustls` with the `webpki-roots`
/// trust store, matching the teacher's `create_tls_connector`.
#[derive(Clone)]
pub struct RustlsContextFactory {
    config: Arc<ClientConfig>,
}

impl RustlsContextFactory {
    /// Builds a factory trusting the Mozilla root store bundled by
    /// `webpki-roots`.
    #[must_use]
    pub fn with_webpki_roots() -> Self {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for RustlsContextFactory {
    fn default() -> Self {
        Self::with_webpki_roots()
    }
}

impl SslContextFactory for RustlsContextFactory {
    fn handshaker(
        &self,
        host: &str,
        sni_names: &[String],
    ) -> Result<Box<dyn SslHandshaker>, Error> {
        let sni_source = sni_names.first().map_or(host, String::as_str);
        let server_name = ServerName::try_from(sni_source.to_string())
            .map_err(|e| Error::new(FailureType::SslContextException).with_cause(e))?;
        Ok(Box::new(RustlsHandshaker {
            connector: TlsConnector::from(Arc::clone(&self.config)),
            server_name,
        }))
    }
}

struct RustlsHandshaker {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

#[async_trait]
impl SslHandshaker for RustlsHandshaker {
    async fn handshake(self: Box<Self>, channel: Box<dyn Channel>) -> Result<Box<dyn Channel>, Error> {
        let tls = self
            .connector
            .connect(self.server_name, channel)
            .await
            .map_err(|e| Error::new(FailureType::ConnectionFailedException).with_cause(e))?;
        Ok(Box::new(tls))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn rustls_factory_rejects_unparseable_sni() {
        let factory = RustlsContextFactory::with_webpki_roots();
        let err = factory.handshaker("", &[]).unwrap_err();
        assert_eq!(err.failure_type(), FailureType::SslContextException);
    }

    #[test]
    fn rustls_factory_accepts_valid_host() {
        let factory = RustlsContextFactory::with_webpki_roots();
        assert!(factory.handshaker("smtp.example.com", &[]).is_ok());
    }

    #[test]
    fn rustls_factory_prefers_explicit_sni_name() {
        let factory = RustlsContextFactory::with_webpki_roots();
        let names = vec!["mail.example.org".to_string()];
        assert!(factory.handshaker("10.0.0.1", &names).is_ok());
    }
}
