//! Primitive wire encodings shared by tables and method arguments

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError};

/// Decimal value, `value * 10^(-scale)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    /// Number of decimal digits
    pub scale: u8,

    /// Unscaled value
    pub value: u32,
}

impl Decimal {
    /// Creates a new decimal
    pub fn new(scale: u8, value: u32) -> Self {
        Self { scale, value }
    }
}

/// Returns an error unless `src` holds at least `len` more bytes
pub fn ensure_remaining(src: &impl Buf, len: usize) -> Result<(), DecodeError> {
    match src.remaining() {
        n if n >= len => Ok(()),
        n => Err(DecodeError::Incomplete { needed: len - n }),
    }
}

/// Reads an octet
pub fn get_u8(src: &mut impl Buf) -> Result<u8, DecodeError> {
    ensure_remaining(src, 1)?;
    Ok(src.get_u8())
}

/// Reads a big-endian short
pub fn get_u16(src: &mut impl Buf) -> Result<u16, DecodeError> {
    ensure_remaining(src, 2)?;
    Ok(src.get_u16())
}

/// Reads a big-endian long
pub fn get_u32(src: &mut impl Buf) -> Result<u32, DecodeError> {
    ensure_remaining(src, 4)?;
    Ok(src.get_u32())
}

/// Reads a big-endian long long
pub fn get_u64(src: &mut impl Buf) -> Result<u64, DecodeError> {
    ensure_remaining(src, 8)?;
    Ok(src.get_u64())
}

/// Reads a short string: one length octet followed by UTF-8 bytes
pub fn get_short_string(src: &mut impl Buf) -> Result<String, DecodeError> {
    let len = get_u8(src)? as usize;
    ensure_remaining(src, len)?;
    let bytes = src.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}

/// Writes a short string
pub fn put_short_string(dst: &mut BytesMut, value: &str) -> Result<(), EncodeError> {
    let len = u8::try_from(value.len()).map_err(|_| EncodeError::ShortStringTooLong(value.len()))?;
    dst.put_u8(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}

/// Reads a long string: a 32-bit length followed by raw bytes
pub fn get_long_string(src: &mut impl Buf) -> Result<Bytes, DecodeError> {
    let len = get_u32(src)? as usize;
    ensure_remaining(src, len)?;
    Ok(src.copy_to_bytes(len))
}

/// Writes a long string
pub fn put_long_string(dst: &mut BytesMut, value: &[u8]) -> Result<(), EncodeError> {
    let len = u32::try_from(value.len()).map_err(|_| EncodeError::TooLong(value.len()))?;
    dst.put_u32(len);
    dst.put_slice(value);
    Ok(())
}
