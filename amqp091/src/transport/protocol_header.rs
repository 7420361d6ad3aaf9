//! Implements the protocol header

use std::{convert::TryFrom, io};

use amqp091_types::constants::{MAJOR, MINOR, REVISION};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

const PROTOCOL_HEADER_PREFIX: &[u8; 4] = b"AMQP";

/// The octet following the prefix, always zero for AMQP 0-9-1
const PROTOCOL_ID: u8 = 0x0;

/// Protocol header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    /// Major number
    pub major: u8,

    /// Minor number
    pub minor: u8,

    /// Revision number
    pub revision: u8,
}

impl Default for ProtocolHeader {
    fn default() -> Self {
        Self::amqp()
    }
}

impl ProtocolHeader {
    /// Creates a new protocol header
    pub fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// The AMQP 0-9-1 protocol header
    pub fn amqp() -> Self {
        Self::new(MAJOR, MINOR, REVISION)
    }
}

impl From<ProtocolHeader> for [u8; 8] {
    fn from(value: ProtocolHeader) -> Self {
        [
            PROTOCOL_HEADER_PREFIX[0], // b'A'
            PROTOCOL_HEADER_PREFIX[1], // b'M'
            PROTOCOL_HEADER_PREFIX[2], // b'Q'
            PROTOCOL_HEADER_PREFIX[3], // b'P'
            PROTOCOL_ID,
            value.major,
            value.minor,
            value.revision,
        ]
    }
}

/// Parses the header a broker answers with when it rejects the requested version
impl TryFrom<[u8; 8]> for ProtocolHeader {
    type Error = [u8; 8];

    fn try_from(v: [u8; 8]) -> Result<Self, Self::Error> {
        if &v[..4] != PROTOCOL_HEADER_PREFIX || v[4] != PROTOCOL_ID {
            return Err(v);
        }
        Ok(Self::new(v[5], v[6], v[7]))
    }
}

/// Encoder of protocol headers
#[derive(Debug, Clone, Default)]
pub struct ProtocolHeaderCodec {}

impl ProtocolHeaderCodec {
    /// Creates a new protocol header codec
    pub fn new() -> Self {
        Self {}
    }
}

impl Encoder<ProtocolHeader> for ProtocolHeaderCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ProtocolHeader, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let buf: [u8; 8] = item.into();
        dst.put(&buf[..]);
        Ok(())
    }
}
