//! TLS socket establishment
//!
//! TLS is provided either by `rustls` or by `native-tls`, selected with the cargo features of
//! the same names. `rustls` is used if both are enabled. Without either feature
//! [`tls_supported`] returns `false` and [`open_secure`] fails with
//! [`ConfigError::TlsNotSupported`].

use std::path::{Path, PathBuf};

use crate::{
    connection::builder::DEFAULT_VERIFY_HOSTNAME,
    error::{ConfigError, Error},
};

use super::Socket;

#[cfg(any(feature = "rustls", feature = "native-tls"))]
use crate::error::{LibraryError, LibraryStatus};

#[cfg(any(feature = "rustls", feature = "native-tls"))]
const CA_CERT_DESCRIPTION: &str = "Error setting CA certificate for socket";
#[cfg(any(feature = "rustls", feature = "native-tls"))]
const CLIENT_CERT_DESCRIPTION: &str = "Error setting client certificate for socket";
#[cfg(any(feature = "rustls", feature = "native-tls"))]
const OPEN_DESCRIPTION: &str = "Error opening TLS socket";

/// Whether this build can open TLS sockets
pub const fn tls_supported() -> bool {
    cfg!(any(feature = "rustls", feature = "native-tls"))
}

/// Client certificate and key, both PEM encoded files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Path to the client certificate chain
    pub cert_path: PathBuf,

    /// Path to the PKCS#8 private key
    pub key_path: PathBuf,
}

/// Certificate material and verification policy of a secure connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsParams {
    ca_cert_path: Option<PathBuf>,
    identity: Option<ClientIdentity>,
    verify_hostname: bool,
}

impl Default for TlsParams {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            identity: None,
            verify_hostname: DEFAULT_VERIFY_HOSTNAME,
        }
    }
}

impl TlsParams {
    /// Creates TLS parameters
    ///
    /// The client certificate and key must be given together or not at all.
    pub fn new(
        ca_cert_path: Option<PathBuf>,
        client_cert_path: Option<PathBuf>,
        client_key_path: Option<PathBuf>,
        verify_hostname: bool,
    ) -> Result<Self, ConfigError> {
        let identity = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => Some(ClientIdentity {
                cert_path,
                key_path,
            }),
            (None, None) => None,
            _ => return Err(ConfigError::UnpairedClientIdentity),
        };
        Ok(Self {
            ca_cert_path,
            identity,
            verify_hostname,
        })
    }

    /// Like [`TlsParams::new`] but an empty path means the path is not set
    pub fn from_paths(
        ca_cert_path: &str,
        client_key_path: &str,
        client_cert_path: &str,
        verify_hostname: bool,
    ) -> Result<Self, ConfigError> {
        fn non_empty(path: &str) -> Option<PathBuf> {
            (!path.is_empty()).then(|| PathBuf::from(path))
        }

        Self::new(
            non_empty(ca_cert_path),
            non_empty(client_cert_path),
            non_empty(client_key_path),
            verify_hostname,
        )
    }

    /// CA certificate file, `None` means the default trust roots
    pub fn ca_cert_path(&self) -> Option<&Path> {
        self.ca_cert_path.as_deref()
    }

    /// Client identity, if any
    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    /// Whether the broker certificate chain and host name are verified
    pub fn verify_hostname(&self) -> bool {
        self.verify_hostname
    }
}

/// Opens a TLS socket to `host:port`
///
/// Certificate material is loaded before any socket activity.
#[cfg_attr(feature = "tracing", tracing::instrument(skip(params)))]
pub fn open_secure(host: &str, port: u16, params: &TlsParams) -> Result<Socket, Error> {
    backend::open_secure(host, port, params).map_err(Into::into)
}

#[cfg(feature = "rustls")]
use rustls_backend as backend;

#[cfg(all(feature = "native-tls", not(feature = "rustls")))]
use native_tls_backend as backend;

#[cfg(not(any(feature = "rustls", feature = "native-tls")))]
mod backend {
    use crate::error::{ConfigError, Error};

    use super::{Socket, TlsParams};

    pub(super) fn open_secure(
        _host: &str,
        _port: u16,
        _params: &TlsParams,
    ) -> Result<Socket, Error> {
        Err(ConfigError::TlsNotSupported.into())
    }
}

#[cfg(any(feature = "rustls", feature = "native-tls"))]
fn ssl_error(description: &str) -> impl FnOnce(std::io::Error) -> LibraryError + '_ {
    move |err| {
        LibraryError::new(LibraryStatus::SslError)
            .with_description(description)
            .with_source(err)
    }
}

#[cfg(feature = "rustls")]
mod rustls_backend {
    use std::{fs::File, io::BufReader, path::Path, sync::Arc};

    use librustls::{
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        crypto::{self, CryptoProvider},
        pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
        CertificateError, ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore,
        SignatureScheme, StreamOwned,
    };

    use crate::error::{LibraryError, LibraryStatus};

    use super::{
        super::socket::connect_tcp, ssl_error, Socket, TlsParams, CA_CERT_DESCRIPTION,
        CLIENT_CERT_DESCRIPTION, OPEN_DESCRIPTION,
    };

    pub(super) fn open_secure(
        host: &str,
        port: u16,
        params: &TlsParams,
    ) -> Result<Socket, LibraryError> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Using rustls");
        #[cfg(feature = "log")]
        log::debug!("Using rustls");

        let config = client_config(params)?;
        let server_name = ServerName::try_from(host.to_owned()).map_err(|err| {
            LibraryError::new(LibraryStatus::SslConnectionFailed)
                .with_description(OPEN_DESCRIPTION)
                .with_source(err)
        })?;
        let mut conn = ClientConnection::new(Arc::new(config), server_name).map_err(|err| {
            LibraryError::new(LibraryStatus::SslConnectionFailed)
                .with_description(OPEN_DESCRIPTION)
                .with_source(err)
        })?;

        let mut tcp = connect_tcp(host, port)?;
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp).map_err(handshake_error)?;
        }
        Ok(Socket::Rustls(Box::new(StreamOwned::new(conn, tcp))))
    }

    fn client_config(params: &TlsParams) -> Result<ClientConfig, LibraryError> {
        let provider = Arc::new(crypto::ring::default_provider());

        let ca_certs = match params.ca_cert_path() {
            Some(path) => Some(load_certs(path).map_err(ssl_error(CA_CERT_DESCRIPTION))?),
            None => None,
        };
        let identity = match params.identity() {
            Some(identity) => {
                let certs = load_certs(&identity.cert_path)
                    .map_err(ssl_error(CLIENT_CERT_DESCRIPTION))?;
                let key = load_private_key(&identity.key_path)
                    .map_err(ssl_error(CLIENT_CERT_DESCRIPTION))?;
                Some((certs, key))
            }
            None => None,
        };

        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|err| {
                LibraryError::new(LibraryStatus::SslError)
                    .with_description(OPEN_DESCRIPTION)
                    .with_source(err)
            })?;

        let builder = if params.verify_hostname() {
            let mut roots = RootCertStore::empty();
            match ca_certs {
                Some(certs) => {
                    let (added, _ignored) = roots.add_parsable_certificates(certs);
                    if added == 0 {
                        return Err(LibraryError::new(LibraryStatus::SslError)
                            .with_description(CA_CERT_DESCRIPTION));
                    }
                }
                None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
            }
            builder.with_root_certificates(roots)
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
        };

        match identity {
            Some((certs, key)) => builder.with_client_auth_cert(certs, key).map_err(|err| {
                LibraryError::new(LibraryStatus::SslError)
                    .with_description(CLIENT_CERT_DESCRIPTION)
                    .with_source(err)
            }),
            None => Ok(builder.with_no_client_auth()),
        }
    }

    fn load_certs(path: &Path) -> std::io::Result<Vec<CertificateDer<'static>>> {
        let mut reader = BufReader::new(File::open(path)?);
        let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("no certificate found in {}", path.display()),
            ));
        }
        Ok(certs)
    }

    fn load_private_key(path: &Path) -> std::io::Result<PrivateKeyDer<'static>> {
        let mut reader = BufReader::new(File::open(path)?);
        rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("no private key found in {}", path.display()),
            )
        })
    }

    fn handshake_error(err: std::io::Error) -> LibraryError {
        let status = match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<librustls::Error>())
        {
            Some(librustls::Error::InvalidCertificate(
                CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
            )) => LibraryStatus::SslHostnameVerifyFailed,
            Some(librustls::Error::InvalidCertificate(_)) => LibraryStatus::SslPeerVerifyFailed,
            _ => LibraryStatus::SslConnectionFailed,
        };
        LibraryError::new(status)
            .with_description(OPEN_DESCRIPTION)
            .with_source(err)
    }

    /// Accepts any certificate chain and name, still checks handshake signatures
    #[derive(Debug)]
    struct NoVerification(Arc<CryptoProvider>);

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, librustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, librustls::Error> {
            crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, librustls::Error> {
            crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}

#[cfg(all(feature = "native-tls", not(feature = "rustls")))]
mod native_tls_backend {
    use std::fs;

    use libnative_tls::{Certificate, HandshakeError, Identity, TlsConnector};

    use crate::error::{LibraryError, LibraryStatus};

    use super::{
        super::socket::connect_tcp, ssl_error, Socket, TlsParams, CA_CERT_DESCRIPTION,
        CLIENT_CERT_DESCRIPTION, OPEN_DESCRIPTION,
    };

    pub(super) fn open_secure(
        host: &str,
        port: u16,
        params: &TlsParams,
    ) -> Result<Socket, LibraryError> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Using native-tls");
        #[cfg(feature = "log")]
        log::debug!("Using native-tls");

        let mut builder = TlsConnector::builder();
        builder
            .danger_accept_invalid_certs(!params.verify_hostname())
            .danger_accept_invalid_hostnames(!params.verify_hostname());

        if let Some(path) = params.ca_cert_path() {
            let pem = fs::read(path).map_err(ssl_error(CA_CERT_DESCRIPTION))?;
            let cert = Certificate::from_pem(&pem).map_err(|err| {
                LibraryError::new(LibraryStatus::SslError)
                    .with_description(CA_CERT_DESCRIPTION)
                    .with_source(err)
            })?;
            builder.add_root_certificate(cert);
        }

        if let Some(identity) = params.identity() {
            let cert = fs::read(&identity.cert_path).map_err(ssl_error(CLIENT_CERT_DESCRIPTION))?;
            let key = fs::read(&identity.key_path).map_err(ssl_error(CLIENT_CERT_DESCRIPTION))?;
            let identity = Identity::from_pkcs8(&cert, &key).map_err(|err| {
                LibraryError::new(LibraryStatus::SslError)
                    .with_description(CLIENT_CERT_DESCRIPTION)
                    .with_source(err)
            })?;
            builder.identity(identity);
        }

        let connector = builder.build().map_err(|err| {
            LibraryError::new(LibraryStatus::SslError)
                .with_description(OPEN_DESCRIPTION)
                .with_source(err)
        })?;

        let tcp = connect_tcp(host, port)?;
        match connector.connect(host, tcp) {
            Ok(stream) => Ok(Socket::NativeTls(stream)),
            Err(HandshakeError::Failure(err)) => Err(LibraryError::new(
                LibraryStatus::SslConnectionFailed,
            )
            .with_description(OPEN_DESCRIPTION)
            .with_source(err)),
            Err(HandshakeError::WouldBlock(_)) => {
                Err(LibraryError::new(LibraryStatus::SslConnectionFailed)
                    .with_description(OPEN_DESCRIPTION))
            }
        }
    }
}
