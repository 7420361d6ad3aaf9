//! Methods of the connection class, plus `channel.close`
//!
//! These are the only methods exchanged while a connection is being opened or closed.
//! A broker may also raise `channel.close` as an exception, so it is decoded too. Every
//! other method is kept as [`Method::Unknown`] with its raw arguments.

use std::convert::TryFrom;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    constants::{CLASS_CHANNEL, CLASS_CONNECTION},
    error::{DecodeError, EncodeError},
    primitives::{
        get_long_string, get_short_string, get_u16, get_u32, get_u8, put_long_string,
        put_short_string,
    },
    reply_code::ReplyCode,
    table::FieldTable,
};

/// Method ids of the connection class
#[allow(missing_docs)]
pub mod connection {
    pub const START: u16 = 10;
    pub const START_OK: u16 = 11;
    pub const TUNE: u16 = 30;
    pub const TUNE_OK: u16 = 31;
    pub const OPEN: u16 = 40;
    pub const OPEN_OK: u16 = 41;
    pub const CLOSE: u16 = 50;
    pub const CLOSE_OK: u16 = 51;
}

/// Method ids of the channel class
#[allow(missing_docs)]
pub mod channel {
    pub const CLOSE: u16 = 40;
}

/// `connection.start`, sent by the broker to begin the handshake
#[derive(Debug, Clone, PartialEq)]
pub struct Start {
    /// Protocol major version of the broker
    pub version_major: u8,

    /// Protocol minor version of the broker
    pub version_minor: u8,

    /// Properties describing the broker
    pub server_properties: FieldTable,

    /// Space separated list of SASL mechanisms
    pub mechanisms: Bytes,

    /// Space separated list of message locales
    pub locales: Bytes,
}

impl Start {
    /// Iterates over the advertised SASL mechanisms
    pub fn mechanisms(&self) -> impl Iterator<Item = &[u8]> {
        split_spaces(&self.mechanisms)
    }

    /// Returns true if the broker offers `mechanism`
    pub fn supports_mechanism(&self, mechanism: &str) -> bool {
        self.mechanisms().any(|m| m == mechanism.as_bytes())
    }
}

fn split_spaces(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes.split(|b| *b == b' ').filter(|s| !s.is_empty())
}

/// `connection.start-ok`, the client's SASL selection and initial response
#[derive(Debug, Clone, PartialEq)]
pub struct StartOk {
    /// Properties describing the client
    pub client_properties: FieldTable,

    /// Selected SASL mechanism
    pub mechanism: String,

    /// SASL initial response
    pub response: Bytes,

    /// Selected message locale
    pub locale: String,
}

/// Arguments of `connection.tune` and `connection.tune-ok`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tune {
    /// Highest channel number, zero means no limit
    pub channel_max: u16,

    /// Largest frame size, zero means no limit
    pub frame_max: u32,

    /// Heartbeat delay in seconds, zero means disabled
    pub heartbeat: u16,
}

/// `connection.open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Open {
    /// Virtual host to open
    pub virtual_host: String,

    /// Reserved, must be empty
    pub capabilities: String,

    /// Reserved, must be false
    pub insist: bool,
}

impl Open {
    /// Creates an open request for `virtual_host`
    pub fn new(virtual_host: impl Into<String>) -> Self {
        Self {
            virtual_host: virtual_host.into(),
            capabilities: String::new(),
            insist: false,
        }
    }
}

/// `connection.open-ok`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOk {
    /// Reserved
    pub known_hosts: String,
}

/// Arguments of `connection.close` and `channel.close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Close {
    /// Reply code
    pub reply_code: u16,

    /// Human readable reason
    pub reply_text: String,

    /// Class of the method that caused the close, zero if none
    pub class_id: u16,

    /// Method that caused the close, zero if none
    pub method_id: u16,
}

impl Close {
    /// Creates a close that is not caused by any particular method
    pub fn new(reply_code: ReplyCode, reply_text: impl Into<String>) -> Self {
        Self {
            reply_code: reply_code.code(),
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// Typed reply code
    pub fn reply_code(&self) -> ReplyCode {
        ReplyCode::from(self.reply_code)
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u16(self.reply_code);
        put_short_string(dst, &self.reply_text)?;
        dst.put_u16(self.class_id);
        dst.put_u16(self.method_id);
        Ok(())
    }

    /// Decodes the arguments of a close method
    pub fn decode(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Ok(Self {
            reply_code: get_u16(src)?,
            reply_text: get_short_string(src)?,
            class_id: get_u16(src)?,
            method_id: get_u16(src)?,
        })
    }
}

/// `connection.close-ok`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseOk;

/// A decoded method frame payload
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    /// `connection.start` (10, 10)
    ConnectionStart(Start),

    /// `connection.start-ok` (10, 11)
    ConnectionStartOk(StartOk),

    /// `connection.tune` (10, 30)
    ConnectionTune(Tune),

    /// `connection.tune-ok` (10, 31)
    ConnectionTuneOk(Tune),

    /// `connection.open` (10, 40)
    ConnectionOpen(Open),

    /// `connection.open-ok` (10, 41)
    ConnectionOpenOk(OpenOk),

    /// `connection.close` (10, 50)
    ConnectionClose(Close),

    /// `connection.close-ok` (10, 51)
    ConnectionCloseOk,

    /// `channel.close` (20, 40)
    ChannelClose(Close),

    /// Any other method, arguments kept undecoded
    Unknown {
        /// Class id
        class_id: u16,
        /// Method id
        method_id: u16,
        /// Raw argument bytes
        arguments: Bytes,
    },
}

impl Method {
    /// Class id of the method
    pub fn class_id(&self) -> u16 {
        self.id().0
    }

    /// Method id of the method
    pub fn method_id(&self) -> u16 {
        self.id().1
    }

    /// `(class_id, method_id)`
    pub fn id(&self) -> (u16, u16) {
        match self {
            Method::ConnectionStart(_) => (CLASS_CONNECTION, connection::START),
            Method::ConnectionStartOk(_) => (CLASS_CONNECTION, connection::START_OK),
            Method::ConnectionTune(_) => (CLASS_CONNECTION, connection::TUNE),
            Method::ConnectionTuneOk(_) => (CLASS_CONNECTION, connection::TUNE_OK),
            Method::ConnectionOpen(_) => (CLASS_CONNECTION, connection::OPEN),
            Method::ConnectionOpenOk(_) => (CLASS_CONNECTION, connection::OPEN_OK),
            Method::ConnectionClose(_) => (CLASS_CONNECTION, connection::CLOSE),
            Method::ConnectionCloseOk => (CLASS_CONNECTION, connection::CLOSE_OK),
            Method::ChannelClose(_) => (CLASS_CHANNEL, channel::CLOSE),
            Method::Unknown {
                class_id,
                method_id,
                ..
            } => (*class_id, *method_id),
        }
    }

    /// Writes class id, method id and the arguments
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let (class_id, method_id) = self.id();
        dst.put_u16(class_id);
        dst.put_u16(method_id);

        match self {
            Method::ConnectionStart(start) => {
                dst.put_u8(start.version_major);
                dst.put_u8(start.version_minor);
                start.server_properties.encode(dst)?;
                put_long_string(dst, &start.mechanisms)?;
                put_long_string(dst, &start.locales)?;
            }
            Method::ConnectionStartOk(start_ok) => {
                start_ok.client_properties.encode(dst)?;
                put_short_string(dst, &start_ok.mechanism)?;
                put_long_string(dst, &start_ok.response)?;
                put_short_string(dst, &start_ok.locale)?;
            }
            Method::ConnectionTune(tune) | Method::ConnectionTuneOk(tune) => {
                dst.put_u16(tune.channel_max);
                dst.put_u32(tune.frame_max);
                dst.put_u16(tune.heartbeat);
            }
            Method::ConnectionOpen(open) => {
                put_short_string(dst, &open.virtual_host)?;
                put_short_string(dst, &open.capabilities)?;
                dst.put_u8(open.insist as u8);
            }
            Method::ConnectionOpenOk(open_ok) => put_short_string(dst, &open_ok.known_hosts)?,
            Method::ConnectionClose(close) | Method::ChannelClose(close) => close.encode(dst)?,
            Method::ConnectionCloseOk => {}
            Method::Unknown { arguments, .. } => dst.put_slice(arguments),
        }
        Ok(())
    }

    /// Reads class id, method id and the arguments
    pub fn decode(src: &mut impl Buf) -> Result<Self, DecodeError> {
        let class_id = get_u16(src)?;
        let method_id = get_u16(src)?;

        let method = match (class_id, method_id) {
            (CLASS_CONNECTION, connection::START) => Method::ConnectionStart(Start {
                version_major: get_u8(src)?,
                version_minor: get_u8(src)?,
                server_properties: FieldTable::decode(src)?,
                mechanisms: get_long_string(src)?,
                locales: get_long_string(src)?,
            }),
            (CLASS_CONNECTION, connection::START_OK) => Method::ConnectionStartOk(StartOk {
                client_properties: FieldTable::decode(src)?,
                mechanism: get_short_string(src)?,
                response: get_long_string(src)?,
                locale: get_short_string(src)?,
            }),
            (CLASS_CONNECTION, connection::TUNE) => Method::ConnectionTune(decode_tune(src)?),
            (CLASS_CONNECTION, connection::TUNE_OK) => Method::ConnectionTuneOk(decode_tune(src)?),
            (CLASS_CONNECTION, connection::OPEN) => Method::ConnectionOpen(Open {
                virtual_host: get_short_string(src)?,
                capabilities: get_short_string(src)?,
                insist: get_u8(src)? & 0x01 != 0,
            }),
            (CLASS_CONNECTION, connection::OPEN_OK) => Method::ConnectionOpenOk(OpenOk {
                known_hosts: get_short_string(src)?,
            }),
            (CLASS_CONNECTION, connection::CLOSE) => Method::ConnectionClose(Close::decode(src)?),
            (CLASS_CONNECTION, connection::CLOSE_OK) => Method::ConnectionCloseOk,
            (CLASS_CHANNEL, channel::CLOSE) => Method::ChannelClose(Close::decode(src)?),
            _ => Method::Unknown {
                class_id,
                method_id,
                arguments: src.copy_to_bytes(src.remaining()),
            },
        };
        Ok(method)
    }
}

fn decode_tune(src: &mut impl Buf) -> Result<Tune, DecodeError> {
    Ok(Tune {
        channel_max: get_u16(src)?,
        frame_max: get_u32(src)?,
        heartbeat: get_u16(src)?,
    })
}

macro_rules! impl_try_from_method {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl TryFrom<Method> for $ty {
                type Error = Method;

                fn try_from(method: Method) -> Result<Self, Self::Error> {
                    match method {
                        Method::$variant(value) => Ok(value),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_try_from_method! {
    ConnectionStart => Start,
    ConnectionStartOk => StartOk,
    ConnectionTune => Tune,
    ConnectionOpen => Open,
    ConnectionOpenOk => OpenOk,
    ConnectionClose => Close,
}

impl TryFrom<Method> for CloseOk {
    type Error = Method;

    fn try_from(method: Method) -> Result<Self, Self::Error> {
        match method {
            Method::ConnectionCloseOk => Ok(CloseOk),
            other => Err(other),
        }
    }
}
