//! Plain and TLS sockets

use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
};

use crate::error::{LibraryError, LibraryStatus};

use super::Stream;

/// A connected socket, either plain TCP or TLS over TCP
pub enum Socket {
    /// Plain TCP
    Tcp(TcpStream),

    /// TLS provided by rustls
    #[cfg(feature = "rustls")]
    Rustls(Box<librustls::StreamOwned<librustls::ClientConnection, TcpStream>>),

    /// TLS provided by native-tls
    #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
    NativeTls(libnative_tls::TlsStream<TcpStream>),
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Socket::Tcp(stream) => f.debug_tuple("Tcp").field(stream).finish(),
            #[cfg(feature = "rustls")]
            Socket::Rustls(stream) => f.debug_tuple("Rustls").field(&stream.sock).finish(),
            #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
            Socket::NativeTls(stream) => f.debug_tuple("NativeTls").field(stream.get_ref()).finish(),
        }
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(stream) => stream.read(buf),
            #[cfg(feature = "rustls")]
            Socket::Rustls(stream) => stream.read(buf),
            #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
            Socket::NativeTls(stream) => stream.read(buf),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(stream) => stream.write(buf),
            #[cfg(feature = "rustls")]
            Socket::Rustls(stream) => stream.write(buf),
            #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
            Socket::NativeTls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(stream) => stream.flush(),
            #[cfg(feature = "rustls")]
            Socket::Rustls(stream) => stream.flush(),
            #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
            Socket::NativeTls(stream) => stream.flush(),
        }
    }
}

impl Stream for Socket {
    fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(stream) => TcpStream::shutdown(stream, Shutdown::Both),
            #[cfg(feature = "rustls")]
            Socket::Rustls(stream) => {
                stream.conn.send_close_notify();
                // The peer may already be gone, the TCP shutdown below still has to happen
                let _ = stream.flush();
                stream.sock.shutdown(Shutdown::Both)
            }
            #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
            Socket::NativeTls(stream) => {
                let _ = stream.shutdown();
                stream.get_ref().shutdown(Shutdown::Both)
            }
        }
    }
}

/// Opens a plain TCP socket to `host:port`
#[cfg_attr(feature = "tracing", tracing::instrument)]
pub fn open(host: &str, port: u16) -> Result<Socket, LibraryError> {
    let stream = connect_tcp(host, port)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(peer = ?stream.peer_addr().ok(), "Socket opened");
    #[cfg(feature = "log")]
    log::debug!("Socket opened to {}:{}", host, port);

    Ok(Socket::Tcp(stream))
}

/// Resolves `host` and connects to the first address that accepts
pub(crate) fn connect_tcp(host: &str, port: u16) -> Result<TcpStream, LibraryError> {
    let addrs = (host, port).to_socket_addrs().map_err(|err| {
        LibraryError::new(LibraryStatus::HostnameResolutionFailed)
            .with_description(format!("Error resolving {}", host))
            .with_source(err)
    })?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                // Login frames are small and latency bound
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    match last_err {
        Some(err) => Err(LibraryError::new(LibraryStatus::SocketError)
            .with_description(format!("Error opening socket to {}:{}", host, port))
            .with_source(err)),
        None => Err(LibraryError::new(LibraryStatus::HostnameResolutionFailed)
            .with_description(format!("No address found for {}", host))),
    }
}
