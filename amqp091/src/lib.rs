#![deny(missing_docs, missing_debug_implementations)]

//! A blocking AMQP 0-9-1 client core: connection establishment, the login handshake and the
//! error taxonomy used to report their failures.
//!
//! # Feature flags
//!
//! ```toml
//! default = []
//! ```
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `"rustls"` | TLS support with `rustls` |
//! | `"native-tls"` | TLS support with `native-tls`, `rustls` wins if both are enabled |
//! | `"tracing"` | diagnostic events with `tracing` |
//! | `"log"` | diagnostic events with `log` |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use amqp091::Connection;
//!
//! let mut connection = Connection::builder()
//!     .host("localhost")
//!     .username("guest")
//!     .password("guest")
//!     .open()?;
//! assert!(connection.is_connected());
//! connection.close()?;
//! # Ok::<(), amqp091::Error>(())
//! ```
//!
//! Failures are classified by [`Error::kind`]: configuration faults are reported before any
//! socket activity, library faults are local, broker faults carry the broker's reply code, and
//! a corrupt broker version is a protocol corruption fault.

// Public mods
pub mod connection;
pub mod error;
pub mod frames;
pub mod login;
pub mod rpc;
pub mod sasl_profile;
pub mod session;
pub mod transport;
pub mod uri;
pub mod version;

pub use amqp091_types as types;

pub use connection::{Builder, Connection, ConnectionState};
pub use error::{
    BrokerError, CloseScope, ConfigError, Error, ErrorKind, LibraryError, LibraryStatus,
    VersionError,
};
pub use sasl_profile::SaslProfile;
pub use session::Session;
pub use transport::{tls_supported, TlsParams};
pub use uri::AmqpUri;
pub use version::{compute_broker_version, pack_version};
