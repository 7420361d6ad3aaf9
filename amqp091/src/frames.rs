//! AMQP 0-9-1 frame type and the corresponding encoder and decoder
//!
//! A frame is laid out as
//!
//! ```text
//! +------+---------+---------+-------------+-----------+
//! | type | channel |  size   |   payload   | frame-end |
//! +------+---------+---------+-------------+-----------+
//!  octet   short     long     size octets     0xCE
//! ```

use std::io;

use amqp091_types::{
    constants::{FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEADER_SIZE, FRAME_HEARTBEAT, FRAME_METHOD},
    DecodeError, EncodeError, Method,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Largest reservation made for a partially received frame
const MAX_RESERVE: usize = 8 * 1024;

/// Errors of the frame codec
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO Error {0:?}")]
    Io(#[from] io::Error),

    /// Malformed frame payload
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A value could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The frame end octet is not 0xCE
    #[error("Expecting frame end octet 0xCE, found {0:#04x}")]
    FrameEndMismatch(u8),

    /// Frame type is not method, header, body or heartbeat
    #[error("Unknown frame type {0}")]
    UnknownFrameType(u8),

    /// Frame is larger than the negotiated maximum
    #[error("Frame size {size} exceeds the negotiated maximum {max}")]
    #[allow(missing_docs)]
    MaxFrameSizeExceeded { size: usize, max: usize },

    /// The peer sent a protocol header, it does not speak our version
    #[error("Received protocol header {0:?} instead of a frame")]
    ProtocolHeader([u8; 8]),
}

/// AMQP 0-9-1 frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel of the frame, zero for the connection
    pub channel: u16,

    /// Frame body
    pub body: FrameBody,
}

impl Frame {
    /// Creates a new frame
    pub fn new(channel: impl Into<u16>, body: FrameBody) -> Self {
        Self {
            channel: channel.into(),
            body,
        }
    }

    /// Creates a method frame
    pub fn method(channel: u16, method: Method) -> Self {
        Self::new(channel, FrameBody::Method(method))
    }

    /// Creates a heartbeat frame, which always goes on channel zero
    pub fn heartbeat() -> Self {
        Self::new(0u16, FrameBody::Heartbeat)
    }

    /// Consume the frame to get the frame body
    pub fn into_body(self) -> FrameBody {
        self.body
    }
}

/// Body of a frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// A method
    Method(Method),

    /// Content header, kept undecoded
    Header(Bytes),

    /// Content body
    Body(Bytes),

    /// Heartbeat
    Heartbeat,
}

impl FrameBody {
    fn frame_type(&self) -> u8 {
        match self {
            FrameBody::Method(_) => FRAME_METHOD,
            FrameBody::Header(_) => FRAME_HEADER,
            FrameBody::Body(_) => FRAME_BODY,
            FrameBody::Heartbeat => FRAME_HEARTBEAT,
        }
    }
}

/// Encoder and decoder of frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Max frame size including header and frame end, zero means no limit
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a codec with the given max frame size
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Adopts a newly negotiated max frame size
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.max_frame_size = max_frame_size;
        self
    }

    fn check_size(&self, size: usize) -> Result<(), Error> {
        match self.max_frame_size {
            0 => Ok(()),
            max if size > max => Err(Error::MaxFrameSizeExceeded { size, max }),
            _ => Ok(()),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut payload = BytesMut::new();
        match &item.body {
            FrameBody::Method(method) => method.encode(&mut payload)?,
            FrameBody::Header(bytes) | FrameBody::Body(bytes) => payload.put_slice(bytes),
            FrameBody::Heartbeat => {}
        }

        let size = FRAME_HEADER_SIZE + payload.len() + 1;
        self.check_size(size)?;
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| EncodeError::TooLong(payload.len()))?;

        dst.reserve(size);
        dst.put_u8(item.body.frame_type());
        dst.put_u16(item.channel);
        dst.put_u32(payload_len);
        dst.put(payload);
        dst.put_u8(FRAME_END);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A peer that rejects our protocol version answers with its own protocol header
        if src.first() == Some(&b'A') {
            if src.len() < 8 {
                return Ok(None);
            }
            let mut header = [0u8; 8];
            header.copy_from_slice(&src[..8]);
            src.advance(8);
            return Err(Error::ProtocolHeader(header));
        }

        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let frame_type = src[0];
        let channel = u16::from_be_bytes([src[1], src[2]]);
        let payload_len = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        let size = FRAME_HEADER_SIZE + payload_len + 1;
        self.check_size(size)?;

        if src.len() < size {
            // The declared size is not trusted until the bytes arrive
            src.reserve((size - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let mut payload = src.split_to(payload_len).freeze();
        let frame_end = src.get_u8();
        if frame_end != FRAME_END {
            return Err(Error::FrameEndMismatch(frame_end));
        }

        let body = match frame_type {
            FRAME_METHOD => FrameBody::Method(Method::decode(&mut payload)?),
            FRAME_HEADER => FrameBody::Header(payload),
            FRAME_BODY => FrameBody::Body(payload),
            FRAME_HEARTBEAT => FrameBody::Heartbeat,
            other => return Err(Error::UnknownFrameType(other)),
        };
        Ok(Some(Frame::new(channel, body)))
    }
}
