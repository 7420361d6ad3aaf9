//! SASL profile used for the `connection.start-ok` exchange

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Name of the PLAIN mechanism
pub const PLAIN: &str = "PLAIN";

/// SASL profile
#[derive(Clone, PartialEq, Eq)]
pub enum SaslProfile {
    /// SASL PLAIN with a username and password
    Plain {
        /// Username
        username: String,
        /// Password
        password: String,
    },
}

impl fmt::Debug for SaslProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaslProfile::Plain { username, .. } => f
                .debug_struct("Plain")
                .field("username", username)
                .field("password", &"******")
                .finish(),
        }
    }
}

impl SaslProfile {
    /// Creates a PLAIN profile
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Plain {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Name of the mechanism
    pub fn mechanism(&self) -> &'static str {
        match self {
            SaslProfile::Plain { .. } => PLAIN,
        }
    }

    /// The response carried by `connection.start-ok`
    pub fn initial_response(&self) -> Bytes {
        match self {
            SaslProfile::Plain { username, password } => {
                let username = username.as_bytes();
                let password = password.as_bytes();
                let mut buf = BytesMut::with_capacity(username.len() + password.len() + 2);
                buf.put_u8(0);
                buf.put_slice(username);
                buf.put_u8(0);
                buf.put_slice(password);
                buf.freeze()
            }
        }
    }
}
