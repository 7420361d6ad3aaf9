//! Low level transport that moves protocol headers and frames over a blocking byte stream

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::frames::{self, Frame, FrameCodec};

pub mod protocol_header;
pub mod socket;
pub mod tls;

pub use protocol_header::{ProtocolHeader, ProtocolHeaderCodec};
pub use socket::Socket;
pub use tls::{tls_supported, ClientIdentity, TlsParams};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// A blocking byte stream that a [`Transport`] can be bound to
pub trait Stream: Read + Write {
    /// Shuts down both directions of the stream
    ///
    /// The default does nothing, dropping the stream is enough to release it.
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Frame transport over a blocking byte stream
#[derive(Debug)]
pub struct Transport<Io> {
    io: Io,
    codec: FrameCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl<Io> Transport<Io>
where
    Io: Read + Write,
{
    /// Binds the transport to a byte stream
    pub fn bind(io: Io, max_frame_size: usize) -> Self {
        Self {
            io,
            codec: FrameCodec::new(max_frame_size),
            read_buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            write_buf: BytesMut::new(),
        }
    }

    /// Sends a protocol header
    pub fn send_protocol_header(&mut self, header: ProtocolHeader) -> io::Result<()> {
        let mut buf = BytesMut::with_capacity(8);
        ProtocolHeaderCodec::new().encode(header, &mut buf)?;
        self.io.write_all(&buf)?;
        self.io.flush()
    }

    /// Sends a single frame and flushes it
    pub fn send_frame(&mut self, frame: Frame) -> Result<(), frames::Error> {
        self.write_buf.clear();
        self.codec.encode(frame, &mut self.write_buf)?;
        self.io.write_all(&self.write_buf)?;
        self.io.flush()?;
        Ok(())
    }

    /// Blocks until a complete frame is received
    pub fn recv_frame(&mut self) -> Result<Frame, frames::Error> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                return Ok(frame);
            }
            self.fill_read_buf()?;
        }
    }

    /// Adopts a negotiated max frame size
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.codec.set_max_frame_size(max_frame_size);
        self
    }

    fn fill_read_buf(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.io.read(&mut chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    ))
                }
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl<Io> Transport<Io> {
    /// Get a reference to the underlying stream
    pub fn get_ref(&self) -> &Io {
        &self.io
    }

    /// Get a mutable reference to the underlying stream
    pub fn get_mut(&mut self) -> &mut Io {
        &mut self.io
    }
}
