//! Parsing of `amqp://` and `amqps://` URIs
//!
//! The accepted form is `amqp[s]://[user[:pass]@]host[:port][/vhost]`. Missing parts take
//! these defaults:
//!
//! | part     | default                               |
//! |----------|---------------------------------------|
//! | host     | `localhost`                           |
//! | port     | 5672 for `amqp`, 5671 for `amqps`     |
//! | user     | `guest`                               |
//! | password | `guest`                               |
//! | vhost    | `/` without a path, `""` for path `/` |
//!
//! Credentials and the vhost are percent-decoded, so `%2f` is the vhost `/`.

use std::{fmt, str::FromStr};

use amqp091_types::constants::{PORT, SECURE_PORT};
use percent_encoding::percent_decode_str;
use url::{Host, Url};

/// Default host of a URI without one
pub const DEFAULT_HOST: &str = "localhost";

/// Default username and password of a URI without credentials
pub const DEFAULT_CREDENTIAL: &str = "guest";

/// Default vhost of a URI without a path
pub const DEFAULT_VHOST: &str = "/";

/// Errors parsing an AMQP URI
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    /// Not a URI at all
    #[error(transparent)]
    Parse(#[from] url::ParseError),

    /// Scheme other than `amqp` or `amqps`
    #[error("Unsupported scheme {0:?}, expecting amqp or amqps")]
    UnsupportedScheme(String),

    /// The path has more than one segment
    #[error("Invalid vhost path {0:?}")]
    InvalidVhost(String),

    /// A percent-decoded part is not valid UTF-8
    #[error("Percent-decoded {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `amqp`
    Amqp,

    /// `amqps`
    Amqps,
}

impl Scheme {
    /// Port used when the URI has none
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Amqp => PORT,
            Scheme::Amqps => SECURE_PORT,
        }
    }

    /// Returns true for `amqps`
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Amqps)
    }
}

/// A parsed AMQP URI
#[derive(Clone, PartialEq, Eq)]
pub struct AmqpUri {
    /// Scheme
    pub scheme: Scheme,

    /// Host name or address, IPv6 addresses without brackets
    pub host: String,

    /// Port
    pub port: u16,

    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Virtual host
    pub vhost: String,
}

impl fmt::Debug for AmqpUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpUri")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"******")
            .field("vhost", &self.vhost)
            .finish()
    }
}

impl AmqpUri {
    /// Parses a URI
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let url = Url::parse(uri)?;

        let scheme = match url.scheme() {
            "amqp" => Scheme::Amqp,
            "amqps" => Scheme::Amqps,
            other => return Err(UriError::UnsupportedScheme(other.to_string())),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => decode(domain, "host")?,
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => DEFAULT_HOST.to_string(),
        };

        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let username = match url.username() {
            "" => DEFAULT_CREDENTIAL.to_string(),
            username => decode(username, "username")?,
        };
        let password = match url.password() {
            Some(password) => decode(password, "password")?,
            None => DEFAULT_CREDENTIAL.to_string(),
        };

        let vhost = match url.path() {
            "" => DEFAULT_VHOST.to_string(),
            path => {
                let segment = path.strip_prefix('/').unwrap_or(path);
                if segment.contains('/') {
                    return Err(UriError::InvalidVhost(path.to_string()));
                }
                decode(segment, "vhost")?
            }
        };

        Ok(Self {
            scheme,
            host,
            port,
            username,
            password,
            vhost,
        })
    }
}

impl FromStr for AmqpUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn decode(value: &str, part: &'static str) -> Result<String, UriError> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| UriError::InvalidUtf8(part))
}
