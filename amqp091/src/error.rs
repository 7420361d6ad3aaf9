//! Error types
//!
//! Every failure surfaced by this crate falls in one of four classes:
//!
//! - [`ConfigError`]: the request itself is invalid and nothing was attempted on the wire
//! - [`LibraryError`]: a problem detected locally, usually by the transport
//! - [`BrokerError`]: the broker explicitly rejected a request with `connection.close` or
//!   `channel.close`
//! - [`VersionError`]: the broker advertised a malformed version

use std::{fmt, io};

use amqp091_types::{constants::FRAME_MIN_SIZE, methods::Close, Method, ReplyCode};

use crate::{frames, transport::ProtocolHeader, uri::UriError};

pub use crate::version::VersionError;

/// Top level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration, nothing was sent
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A local fault detected by the library
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// The broker rejected a request
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The broker advertised a corrupt version
    #[error(transparent)]
    ProtocolCorruption(#[from] VersionError),
}

impl Error {
    /// Class of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Library(_) => ErrorKind::Library,
            Error::Broker(_) => ErrorKind::Broker,
            Error::ProtocolCorruption(_) => ErrorKind::ProtocolCorruption,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Library(LibraryError::from(err))
    }
}

impl From<frames::Error> for Error {
    fn from(err: frames::Error) -> Self {
        Self::Library(LibraryError::from(err))
    }
}

/// Class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`Error::Config`]
    Config,

    /// [`Error::Library`]
    Library,

    /// [`Error::Broker`]
    Broker,

    /// [`Error::ProtocolCorruption`]
    ProtocolCorruption,
}

/// Errors found while validating a connection request
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The URI could not be parsed
    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] UriError),

    /// A secure constructor was given an `amqp://` URI
    #[error("URI must use the amqps scheme to open a secure connection")]
    NonSecureUri,

    /// A plain constructor was given an `amqps://` URI
    #[error("URI uses the amqps scheme, open it with a secure constructor")]
    SecureUriRequiresTls,

    /// Only one of client certificate and client key was given
    #[error("Client certificate and client key must be set together")]
    UnpairedClientIdentity,

    /// Neither the `rustls` nor the `native-tls` feature is enabled
    #[error("TLS is not supported by this build")]
    TlsNotSupported,

    /// `frame_max` is non-zero and below the protocol minimum
    #[error("frame_max {0} is below the minimum frame size of {}", FRAME_MIN_SIZE)]
    FrameMaxTooSmall(u32),
}

/// Machine readable code of a [`LibraryError`]
///
/// The numeric values are stable and negative, TLS faults occupy the range from -0x200 down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryStatus {
    /// Malformed data received from the broker
    BadAmqpData,

    /// The host name could not be resolved
    HostnameResolutionFailed,

    /// The broker speaks a different protocol version
    IncompatibleAmqpVersion,

    /// The peer closed the connection
    ConnectionClosed,

    /// Generic socket failure
    SocketError,

    /// A method other than the expected one was received
    WrongMethod,

    /// An operation timed out
    Timeout,

    /// A frame arrived that is not valid in the current state
    UnexpectedState,

    /// The socket has already been released
    SocketClosed,

    /// The broker does not offer the requested SASL mechanism
    BrokerUnsupportedSaslMethod,

    /// TLS setup or handshake failed
    SslError,

    /// The broker certificate does not match the host name
    SslHostnameVerifyFailed,

    /// The broker certificate chain is not trusted
    SslPeerVerifyFailed,

    /// The TLS connection could not be established
    SslConnectionFailed,
}

impl LibraryStatus {
    /// Numeric status code
    pub fn code(&self) -> i32 {
        match self {
            LibraryStatus::BadAmqpData => -0x0002,
            LibraryStatus::HostnameResolutionFailed => -0x0005,
            LibraryStatus::IncompatibleAmqpVersion => -0x0006,
            LibraryStatus::ConnectionClosed => -0x0007,
            LibraryStatus::SocketError => -0x0009,
            LibraryStatus::WrongMethod => -0x000C,
            LibraryStatus::Timeout => -0x000D,
            LibraryStatus::UnexpectedState => -0x0010,
            LibraryStatus::SocketClosed => -0x0011,
            LibraryStatus::BrokerUnsupportedSaslMethod => -0x0013,
            LibraryStatus::SslError => -0x0200,
            LibraryStatus::SslHostnameVerifyFailed => -0x0201,
            LibraryStatus::SslPeerVerifyFailed => -0x0202,
            LibraryStatus::SslConnectionFailed => -0x0203,
        }
    }

    /// Fixed human readable message
    pub fn message(&self) -> &'static str {
        match self {
            LibraryStatus::BadAmqpData => "invalid AMQP data",
            LibraryStatus::HostnameResolutionFailed => "hostname lookup failed",
            LibraryStatus::IncompatibleAmqpVersion => "incompatible AMQP version",
            LibraryStatus::ConnectionClosed => "connection closed unexpectedly",
            LibraryStatus::SocketError => "a socket error occurred",
            LibraryStatus::WrongMethod => "unexpected method received",
            LibraryStatus::Timeout => "request timed out",
            LibraryStatus::UnexpectedState => "unexpected protocol state",
            LibraryStatus::SocketClosed => "socket is closed",
            LibraryStatus::BrokerUnsupportedSaslMethod => {
                "broker does not support the requested SASL mechanism"
            }
            LibraryStatus::SslError => "a SSL error occurred",
            LibraryStatus::SslHostnameVerifyFailed => "SSL hostname verification failed",
            LibraryStatus::SslPeerVerifyFailed => "SSL peer cert verification failed",
            LibraryStatus::SslConnectionFailed => "SSL handshake failed",
        }
    }
}

impl fmt::Display for LibraryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A fault detected by the library, typically by the transport
pub struct LibraryError {
    status: LibraryStatus,
    description: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl LibraryError {
    /// Creates an error with only a status
    pub fn new(status: LibraryStatus) -> Self {
        Self {
            status,
            description: None,
            source: None,
        }
    }

    /// Adds context describing what was being attempted
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches the underlying error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Machine readable status
    pub fn status(&self) -> LibraryStatus {
        self.status
    }

    /// Numeric status code
    pub fn code(&self) -> i32 {
        self.status.code()
    }

    /// Context, if any
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl fmt::Debug for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryError")
            .field("status", &self.status)
            .field("code", &self.status.code())
            .field("description", &self.description)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", description, self.status),
            None => write!(f, "{}", self.status),
        }?;
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for LibraryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<LibraryStatus> for LibraryError {
    fn from(status: LibraryStatus) -> Self {
        Self::new(status)
    }
}

impl From<io::Error> for LibraryError {
    fn from(err: io::Error) -> Self {
        let status = match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => LibraryStatus::ConnectionClosed,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LibraryStatus::Timeout,
            _ => LibraryStatus::SocketError,
        };
        Self::new(status).with_source(err)
    }
}

impl From<frames::Error> for LibraryError {
    fn from(err: frames::Error) -> Self {
        match err {
            frames::Error::Io(err) => Self::from(err),
            frames::Error::ProtocolHeader(header) => {
                let description = match ProtocolHeader::try_from(header) {
                    Ok(header) => format!(
                        "Broker requires AMQP {}-{}-{}",
                        header.major, header.minor, header.revision
                    ),
                    Err(_) => "Broker replied with a malformed protocol header".to_string(),
                };
                Self::new(LibraryStatus::IncompatibleAmqpVersion)
                    .with_description(description)
                    .with_source(frames::Error::ProtocolHeader(header))
            }
            err => Self::new(LibraryStatus::BadAmqpData).with_source(err),
        }
    }
}

/// Which close method carried a [`BrokerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseScope {
    /// `connection.close`, the whole connection is gone
    Connection,

    /// `channel.close` on the given channel
    Channel(u16),

    /// A method that is neither of the close methods
    Unrecognized {
        /// Class id of the method
        class_id: u16,
        /// Method id of the method
        method_id: u16,
    },
}

impl fmt::Display for CloseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseScope::Connection => write!(f, "connection.close"),
            CloseScope::Channel(channel) => write!(f, "channel.close on channel {}", channel),
            CloseScope::Unrecognized {
                class_id,
                method_id,
            } => write!(f, "unrecognized method {}.{}", class_id, method_id),
        }
    }
}

/// An exception raised by the broker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Broker sent {scope}: {reply_code} {reply_text:?}")]
pub struct BrokerError {
    /// Method that carried the exception
    pub scope: CloseScope,

    /// Reply code
    pub reply_code: ReplyCode,

    /// Reply text
    pub reply_text: String,

    /// Class of the request that the broker rejected, zero if none
    pub class_id: u16,

    /// Method of the request that the broker rejected, zero if none
    pub method_id: u16,
}

impl BrokerError {
    /// Classifies a server exception received on `channel`
    ///
    /// An unexpected method is still turned into a broker error. Its arguments are read as
    /// close arguments if possible, otherwise the reply code is zero.
    pub fn from_method(channel: u16, method: Method) -> Self {
        match method {
            Method::ConnectionClose(close) => Self::with_scope(CloseScope::Connection, close),
            Method::ChannelClose(close) => Self::with_scope(CloseScope::Channel(channel), close),
            other => {
                let (class_id, method_id) = other.id();
                let scope = CloseScope::Unrecognized {
                    class_id,
                    method_id,
                };
                let close = match other {
                    Method::Unknown { mut arguments, .. } => Close::decode(&mut arguments).ok(),
                    _ => None,
                };
                match close {
                    Some(close) => Self::with_scope(scope, close),
                    None => Self {
                        scope,
                        reply_code: ReplyCode::Unrecognized(0),
                        reply_text: String::new(),
                        class_id: 0,
                        method_id: 0,
                    },
                }
            }
        }
    }

    fn with_scope(scope: CloseScope, close: Close) -> Self {
        Self {
            scope,
            reply_code: close.reply_code(),
            reply_text: close.reply_text,
            class_id: close.class_id,
            method_id: close.method_id,
        }
    }
}
