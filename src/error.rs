//! Error types for SMTP session and connection operations.

use std::fmt;
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable discriminant identifying the kind of failure.
///
/// These names are part of the crate's public contract: applications may
/// match on them, so variants are never renumbered or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureType {
    /// The server's greeting reply was not `220`.
    ConnectionFailedInvalidGreetingCode,
    /// An exception occurred while establishing the connection.
    ConnectionFailedException,
    /// The idle watchdog fired before the greeting arrived.
    ConnectionFailedExceedIdleMax,
    /// The channel went inactive before a greeting or session existed.
    ConnectionInactive,
    /// An operation was attempted on a session that is already closed.
    OperationProhibitedOnClosedChannel,
    /// `execute` was called while a command was already in flight.
    CommandNotAllowed,
    /// Writing the command line to the channel failed.
    WriteToServerFailed,
    /// Closing the channel itself failed.
    ClosingConnectionFailed,
    /// An exception occurred on an otherwise-healthy channel.
    ChannelException,
    /// The channel disconnected while a session existed.
    ChannelDisconnected,
    /// The idle-read watchdog fired while a command was in flight.
    ChannelTimeout,
    /// The channel went inactive before a greeting existed.
    ChannelInactive,
    /// A continuation was requested for a command that never expects one.
    OperationNotSupportedForCommand,
    /// An argument supplied by the caller was invalid.
    InvalidInput,
    /// A reply line from the server could not be parsed.
    InvalidServerResponse,
    /// More bytes arrived than the protocol stage expected.
    MoreInputThanExpected,
    /// Bytes received where a TLS record was expected were not one.
    NotSslRecord,
    /// The STARTTLS upgrade failed outright.
    StarttlsFailed,
    /// The EHLO reply after STARTTLS negotiation was not positive completion.
    BadEhloResponse,
    /// The server did not advertise STARTTLS in its EHLO reply.
    NoStarttlsCapability,
    /// The STARTTLS reply was not `220`.
    BadStarttlsResponse,
    /// Building the SSL context/handshaker failed.
    SslContextException,
    /// Internal invariant violated; indicates a library bug.
    IllegalState,
}

impl FailureType {
    /// Returns the canonical, stable name used in `Display` output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionFailedInvalidGreetingCode => "CONNECTION_FAILED_INVALID_GREETING_CODE",
            Self::ConnectionFailedException => "CONNECTION_FAILED_EXCEPTION",
            Self::ConnectionFailedExceedIdleMax => "CONNECTION_FAILED_EXCEED_IDLE_MAX",
            Self::ConnectionInactive => "CONNECTION_INACTIVE",
            Self::OperationProhibitedOnClosedChannel => "OPERATION_PROHIBITED_ON_CLOSED_CHANNEL",
            Self::CommandNotAllowed => "COMMAND_NOT_ALLOWED",
            Self::WriteToServerFailed => "WRITE_TO_SERVER_FAILED",
            Self::ClosingConnectionFailed => "CLOSING_CONNECTION_FAILED",
            Self::ChannelException => "CHANNEL_EXCEPTION",
            Self::ChannelDisconnected => "CHANNEL_DISCONNECTED",
            Self::ChannelTimeout => "CHANNEL_TIMEOUT",
            Self::ChannelInactive => "CHANNEL_INACTIVE",
            Self::OperationNotSupportedForCommand => "OPERATION_NOT_SUPPORTED_FOR_COMMAND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidServerResponse => "INVALID_SERVER_RESPONSE",
            Self::MoreInputThanExpected => "MORE_INPUT_THAN_EXPECTED",
            Self::NotSslRecord => "NOT_SSL_RECORD",
            Self::StarttlsFailed => "STARTTLS_FAILED",
            Self::BadEhloResponse => "BAD_EHLO_RESPONSE",
            Self::NoStarttlsCapability => "NO_STARTTLS_CAPABILITY",
            Self::BadStarttlsResponse => "BAD_STARTTLS_RESPONSE",
            Self::SslContextException => "SSL_CONTEXT_EXCEPTION",
            Self::IllegalState => "ILLEGAL_STATE",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SMTP client error.
///
/// Carries a stable [`FailureType`] discriminant plus optional diagnostic
/// context: the originating cause, session id, user context, and a
/// free-form detail string.
///
/// `std::error::Error` is implemented by hand rather than derived via
/// `thiserror` because the `Display` format is the spec-mandated
/// `failureType=...,sId=...,uId=...,message=...` string, not a per-variant
/// message template.
#[derive(Debug)]
pub struct Error {
    failure_type: FailureType,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    session_id: Option<u64>,
    user_context: Option<String>,
    detail: Option<String>,
}

impl Error {
    /// Creates a bare error with only a failure type.
    #[must_use]
    pub fn new(failure_type: FailureType) -> Self {
        Self {
            failure_type,
            cause: None,
            session_id: None,
            user_context: None,
            detail: None,
        }
    }

    /// Attaches a human-readable detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches the session id this error pertains to.
    #[must_use]
    pub const fn with_session_id(mut self, session_id: u64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Attaches the application-supplied user/session context.
    #[must_use]
    pub fn with_user_context(mut self, user_context: impl Into<String>) -> Self {
        self.user_context = Some(user_context.into());
        self
    }

    /// Wraps an underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the stable failure discriminant.
    #[must_use]
    pub const fn failure_type(&self) -> FailureType {
        self.failure_type
    }

    /// Returns the session id this error pertains to, if known.
    #[must_use]
    pub const fn session_id(&self) -> Option<u64> {
        self.session_id
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failureType={}", self.failure_type.as_str())?;
        if let Some(sid) = self.session_id {
            write!(f, ",sId={sid}")?;
        }
        if let Some(uid) = &self.user_context {
            write!(f, ",uId={uid}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ",message={detail}")?;
        } else if let Some(cause) = &self.cause {
            write!(f, ",message={cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(FailureType::ChannelException).with_cause(err)
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Self::new(FailureType::SslContextException).with_cause(err)
    }
}
