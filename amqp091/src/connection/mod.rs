//! Connection handle
//!
//! A [`Connection`] is only ever handed out logged in. Construction either completes the whole
//! sequence of socket open, TLS setup, login and broker version resolution, or releases every
//! resource acquired so far and returns the error.
//!
//! # Example
//!
//! ```rust,no_run
//! use amqp091::Connection;
//!
//! let mut connection = Connection::create("localhost", 5672, "guest", "guest", "/", 131072)?;
//! println!("broker version {:#08x}", connection.broker_version());
//! connection.close()?;
//! # Ok::<(), amqp091::Error>(())
//! ```

use amqp091_types::{FieldTable, ReplyCode};

use crate::{
    error::{ConfigError, Error},
    login::Tuning,
    session::Session,
    transport::Socket,
    uri::AmqpUri,
};

pub mod builder;

pub use builder::Builder;

/// State of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Logged in
    Authenticated,

    /// Closed, the socket is released
    Closed,
}

/// An open AMQP 0-9-1 connection
#[derive(Debug)]
pub struct Connection {
    pub(crate) session: Session<Socket>,
    pub(crate) broker_version: u32,
    pub(crate) state: ConnectionState,
}

impl Connection {
    /// Creates a [`Builder`] for a connection
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Opens a plain connection and logs in
    pub fn create(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        vhost: &str,
        frame_max: u32,
    ) -> Result<Self, Error> {
        Builder::new()
            .host(host)
            .port(port)
            .username(username)
            .password(password)
            .vhost(vhost)
            .frame_max(frame_max)
            .open()
    }

    /// Opens a TLS connection and logs in
    ///
    /// An empty path means the path is not set. Without a CA certificate the default trust
    /// roots are used. The client key and certificate must be given together.
    #[allow(clippy::too_many_arguments)]
    pub fn create_secure(
        ca_cert_path: &str,
        host: &str,
        client_key_path: &str,
        client_cert_path: &str,
        port: u16,
        username: &str,
        password: &str,
        vhost: &str,
        frame_max: u32,
        verify_hostname: bool,
    ) -> Result<Self, Error> {
        let params = builder::secure_params(
            ca_cert_path,
            client_key_path,
            client_cert_path,
            verify_hostname,
        )?;
        Builder::new()
            .host(host)
            .port(port)
            .username(username)
            .password(password)
            .vhost(vhost)
            .frame_max(frame_max)
            .tls(params)
            .open()
    }

    /// Opens a plain connection to an `amqp://` URI
    ///
    /// An `amqps://` URI is rejected, see [`Connection::create_secure_from_uri`].
    pub fn create_from_uri(uri: &str, frame_max: u32) -> Result<Self, Error> {
        let uri = AmqpUri::parse(uri).map_err(ConfigError::from)?;
        if uri.scheme.is_secure() {
            return Err(ConfigError::SecureUriRequiresTls.into());
        }
        Builder::from(uri).frame_max(frame_max).open()
    }

    /// Opens a TLS connection to an `amqps://` URI
    ///
    /// Any other scheme is rejected before a socket is opened.
    pub fn create_secure_from_uri(
        uri: &str,
        ca_cert_path: &str,
        client_key_path: &str,
        client_cert_path: &str,
        verify_hostname: bool,
        frame_max: u32,
    ) -> Result<Self, Error> {
        let uri = AmqpUri::parse(uri).map_err(ConfigError::from)?;
        if !uri.scheme.is_secure() {
            return Err(ConfigError::NonSecureUri.into());
        }
        let params = builder::secure_params(
            ca_cert_path,
            client_key_path,
            client_cert_path,
            verify_hostname,
        )?;
        Builder::from(uri).frame_max(frame_max).tls(params).open()
    }

    /// Packed broker version `0x00MMmmpp`, zero if unknown
    pub fn broker_version(&self) -> u32 {
        self.broker_version
    }

    /// The underlying session
    pub fn session(&self) -> &Session<Socket> {
        &self.session
    }

    /// The underlying session, for channel level collaborators
    pub fn session_mut(&mut self) -> &mut Session<Socket> {
        &mut self.session
    }

    /// Returns true until the connection is closed
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Properties sent by the broker in `connection.start`
    pub fn server_properties(&self) -> &FieldTable {
        self.session.server_properties()
    }

    /// Tuning negotiated at login
    pub fn tuning(&self) -> Tuning {
        self.session.tuning()
    }

    /// Closes the connection
    ///
    /// A graceful `connection.close` is attempted, then the socket is released whether or not
    /// it succeeded. The outcome of the graceful close is returned. Closing a closed connection
    /// does nothing.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub fn close(&mut self) -> Result<(), Error> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;

        let reply = self.session.close(ReplyCode::Success);
        self.session.destroy();
        reply.check()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(_error) = self.close() {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_error, "Graceful close failed");
            #[cfg(feature = "log")]
            log::warn!("Graceful close failed: {}", _error);
        }
    }
}
