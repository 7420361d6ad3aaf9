//! Connection builder and its defaults

use std::fmt;

use amqp091_types::{
    constants::{PORT, SECURE_PORT},
    FieldTable,
};

use crate::{
    error::{ConfigError, Error},
    login::{self, validate_frame_max},
    sasl_profile::SaslProfile,
    session::Session,
    transport::{socket, tls, TlsParams},
    uri::AmqpUri,
    version::compute_broker_version,
};

use super::{Connection, ConnectionState};

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of a plain connection
pub const DEFAULT_PORT: u16 = PORT;

/// Default port of a secure connection
pub const DEFAULT_SECURE_PORT: u16 = SECURE_PORT;

/// Default username
pub const DEFAULT_USERNAME: &str = "guest";

/// Default password
pub const DEFAULT_PASSWORD: &str = "guest";

/// Default virtual host
pub const DEFAULT_VHOST: &str = "/";

/// Default requested max frame size
pub const DEFAULT_FRAME_MAX: u32 = 131072;

/// Default hostname verification policy of a secure connection
pub const DEFAULT_VERIFY_HOSTNAME: bool = true;

/// Connection builder
#[derive(Clone)]
pub struct Builder {
    /// Broker host name or address
    pub host: String,

    /// Broker port, `None` picks the default port of a plain or secure connection
    pub port: Option<u16>,

    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Virtual host
    pub vhost: String,

    /// Requested max frame size, zero means no limit
    pub frame_max: u32,

    /// TLS parameters, `None` opens a plain connection
    pub tls: Option<TlsParams>,

    /// Extra entries of the client properties sent at login
    pub client_properties: FieldTable,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"******")
            .field("vhost", &self.vhost)
            .field("frame_max", &self.frame_max)
            .field("tls", &self.tls)
            .field("client_properties", &self.client_properties)
            .finish()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Creates a builder with the default parameters
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            vhost: DEFAULT_VHOST.to_string(),
            frame_max: DEFAULT_FRAME_MAX,
            tls: None,
            client_properties: FieldTable::new(),
        }
    }

    /// Creates a builder from an `amqp://` or `amqps://` URI
    ///
    /// An `amqps` URI selects TLS with the default trust roots and hostname verification.
    pub fn from_uri(uri: &str) -> Result<Self, ConfigError> {
        let uri = AmqpUri::parse(uri)?;
        let tls = uri.scheme.is_secure().then(TlsParams::default);
        Ok(Self::from(uri).tls_params(tls))
    }

    /// Broker host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Broker port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// The port that [`Builder::open`] connects to
    pub fn resolved_port(&self) -> u16 {
        match (self.port, &self.tls) {
            (Some(port), _) => port,
            (None, Some(_)) => DEFAULT_SECURE_PORT,
            (None, None) => DEFAULT_PORT,
        }
    }

    /// Username
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Virtual host
    pub fn vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = vhost.into();
        self
    }

    /// Requested max frame size, must be zero or at least 4096
    pub fn frame_max(mut self, frame_max: u32) -> Self {
        self.frame_max = frame_max;
        self
    }

    /// Opens a secure connection with the given parameters
    pub fn tls(mut self, params: TlsParams) -> Self {
        self.tls = Some(params);
        self
    }

    fn tls_params(mut self, params: Option<TlsParams>) -> Self {
        self.tls = params;
        self
    }

    /// Adds an entry to the client properties
    pub fn client_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<amqp091_types::FieldValue>,
    ) -> Self {
        self.client_properties.insert(key, value);
        self
    }

    /// Replaces the extra client properties
    pub fn client_properties(mut self, properties: FieldTable) -> Self {
        self.client_properties = properties;
        self
    }

    /// Opens the connection
    ///
    /// Either a logged in connection is returned or every resource acquired along the way is
    /// released before the error is returned.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(host = %self.host, port = self.resolved_port(), vhost = %self.vhost)))]
    pub fn open(&self) -> Result<Connection, Error> {
        validate_frame_max(self.frame_max)?;
        if self.tls.is_some() && !tls::tls_supported() {
            return Err(ConfigError::TlsNotSupported.into());
        }

        let port = self.resolved_port();
        let mut session = Session::new();
        let socket = match &self.tls {
            Some(params) => tls::open_secure(&self.host, port, params)?,
            None => socket::open(&self.host, port)?,
        };
        session.attach(socket);

        let sasl = SaslProfile::plain(self.username.clone(), self.password.clone());
        let server_properties = login::login(
            &mut session,
            &self.vhost,
            self.frame_max,
            &sasl,
            &self.client_properties,
        )?;
        let broker_version = compute_broker_version(server_properties)?;

        if broker_version == 0 {
            #[cfg(feature = "tracing")]
            tracing::debug!("Broker did not advertise a usable version");
            #[cfg(feature = "log")]
            log::debug!("Broker did not advertise a usable version");
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(broker_version = %format_args!("{:#08x}", broker_version), "Connection opened");
        #[cfg(feature = "log")]
        log::debug!("Connection opened, broker version {:#08x}", broker_version);

        Ok(Connection {
            session,
            broker_version,
            state: ConnectionState::Authenticated,
        })
    }
}

impl From<AmqpUri> for Builder {
    fn from(uri: AmqpUri) -> Self {
        Self {
            host: uri.host,
            port: Some(uri.port),
            username: uri.username,
            password: uri.password,
            vhost: uri.vhost,
            ..Self::new()
        }
    }
}

/// Validates the secure constructor's arguments into TLS parameters
pub(crate) fn secure_params(
    ca_cert_path: &str,
    client_key_path: &str,
    client_cert_path: &str,
    verify_hostname: bool,
) -> Result<TlsParams, Error> {
    let params =
        TlsParams::from_paths(ca_cert_path, client_key_path, client_cert_path, verify_hostname)?;
    if !tls::tls_supported() {
        return Err(ConfigError::TlsNotSupported.into());
    }
    Ok(params)
}
