//! Wire encoding and decoding errors

/// Errors found while decoding wire data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before the value was complete
    #[error("Unexpected end of input, {needed} more bytes needed")]
    Incomplete {
        /// Number of missing bytes
        needed: usize,
    },

    /// Found an unknown field value type tag
    #[error("Invalid field value type tag {0:#04x}")]
    InvalidTypeTag(u8),

    /// A short string was not valid UTF-8
    #[error("Invalid UTF-8 encoding")]
    InvalidUtf8,

    /// Field tables or arrays are nested deeper than the decoder accepts
    #[error("Field tables nested deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// Errors found while encoding wire data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A short string is limited to 255 bytes
    #[error("Short string of {0} bytes exceeds 255 bytes")]
    ShortStringTooLong(usize),

    /// A long string, table or array is limited to `u32::MAX` bytes
    #[error("Value of {0} bytes exceeds the 32-bit length prefix")]
    TooLong(usize),
}
