//! Field tables and field values
//!
//! Value type tags follow the RabbitMQ errata of the 0-9-1 specification, which is what
//! every broker in use actually speaks.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

pub use indexmap::map::{Iter, Keys, Values};

use crate::{
    error::{DecodeError, EncodeError},
    primitives::{
        ensure_remaining, get_long_string, get_short_string, get_u16, get_u32, get_u64, get_u8,
        put_long_string, put_short_string, Decimal,
    },
};

/// Maximum depth of nested tables and arrays accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 64;

/// Type tags of field values
#[allow(missing_docs)]
pub mod tag {
    pub const BOOLEAN: u8 = b't';
    pub const SHORT_SHORT_INT: u8 = b'b';
    pub const SHORT_SHORT_UINT: u8 = b'B';
    pub const SHORT_INT: u8 = b's';
    pub const SHORT_UINT: u8 = b'u';
    pub const LONG_INT: u8 = b'I';
    pub const LONG_UINT: u8 = b'i';
    pub const LONG_LONG_INT: u8 = b'l';
    pub const FLOAT: u8 = b'f';
    pub const DOUBLE: u8 = b'd';
    pub const DECIMAL: u8 = b'D';
    pub const LONG_STRING: u8 = b'S';
    pub const BYTE_ARRAY: u8 = b'x';
    pub const FIELD_ARRAY: u8 = b'A';
    pub const TIMESTAMP: u8 = b'T';
    pub const FIELD_TABLE: u8 = b'F';
    pub const VOID: u8 = b'V';
}

/// A typed value in a field table or field array
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `t`
    Boolean(bool),

    /// `b`
    ShortShortInt(i8),

    /// `B`
    ShortShortUInt(u8),

    /// `s`
    ShortInt(i16),

    /// `u`
    ShortUInt(u16),

    /// `I`
    LongInt(i32),

    /// `i`
    LongUInt(u32),

    /// `l`
    LongLongInt(i64),

    /// `f`
    Float(f32),

    /// `d`
    Double(f64),

    /// `D`
    Decimal(Decimal),

    /// `S`, raw bytes that are usually but not necessarily UTF-8
    LongString(Bytes),

    /// `x`
    ByteArray(Bytes),

    /// `A`
    FieldArray(Vec<FieldValue>),

    /// `T`, seconds since the epoch
    Timestamp(u64),

    /// `F`
    FieldTable(FieldTable),

    /// `V`
    Void,
}

impl FieldValue {
    /// Returns the type tag used on the wire
    pub fn type_tag(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => tag::BOOLEAN,
            FieldValue::ShortShortInt(_) => tag::SHORT_SHORT_INT,
            FieldValue::ShortShortUInt(_) => tag::SHORT_SHORT_UINT,
            FieldValue::ShortInt(_) => tag::SHORT_INT,
            FieldValue::ShortUInt(_) => tag::SHORT_UINT,
            FieldValue::LongInt(_) => tag::LONG_INT,
            FieldValue::LongUInt(_) => tag::LONG_UINT,
            FieldValue::LongLongInt(_) => tag::LONG_LONG_INT,
            FieldValue::Float(_) => tag::FLOAT,
            FieldValue::Double(_) => tag::DOUBLE,
            FieldValue::Decimal(_) => tag::DECIMAL,
            FieldValue::LongString(_) => tag::LONG_STRING,
            FieldValue::ByteArray(_) => tag::BYTE_ARRAY,
            FieldValue::FieldArray(_) => tag::FIELD_ARRAY,
            FieldValue::Timestamp(_) => tag::TIMESTAMP,
            FieldValue::FieldTable(_) => tag::FIELD_TABLE,
            FieldValue::Void => tag::VOID,
        }
    }

    /// Returns the boolean if this is a [`FieldValue::Boolean`]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the raw bytes of a long string or byte array
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::LongString(bytes) | FieldValue::ByteArray(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the nested table if this is a [`FieldValue::FieldTable`]
    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            FieldValue::FieldTable(table) => Some(table),
            _ => None,
        }
    }

    /// Returns the nested table mutably if this is a [`FieldValue::FieldTable`]
    pub fn as_table_mut(&mut self) -> Option<&mut FieldTable> {
        match self {
            FieldValue::FieldTable(table) => Some(table),
            _ => None,
        }
    }

    /// Writes the type tag followed by the value
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        dst.put_u8(self.type_tag());
        match self {
            FieldValue::Boolean(value) => dst.put_u8(*value as u8),
            FieldValue::ShortShortInt(value) => dst.put_i8(*value),
            FieldValue::ShortShortUInt(value) => dst.put_u8(*value),
            FieldValue::ShortInt(value) => dst.put_i16(*value),
            FieldValue::ShortUInt(value) => dst.put_u16(*value),
            FieldValue::LongInt(value) => dst.put_i32(*value),
            FieldValue::LongUInt(value) => dst.put_u32(*value),
            FieldValue::LongLongInt(value) => dst.put_i64(*value),
            FieldValue::Float(value) => dst.put_f32(*value),
            FieldValue::Double(value) => dst.put_f64(*value),
            FieldValue::Decimal(value) => {
                dst.put_u8(value.scale);
                dst.put_u32(value.value);
            }
            FieldValue::LongString(bytes) | FieldValue::ByteArray(bytes) => {
                put_long_string(dst, bytes)?
            }
            FieldValue::FieldArray(values) => {
                let mut buf = BytesMut::new();
                for value in values {
                    value.encode(&mut buf)?;
                }
                put_long_string(dst, &buf)?;
            }
            FieldValue::Timestamp(value) => dst.put_u64(*value),
            FieldValue::FieldTable(table) => table.encode(dst)?,
            FieldValue::Void => {}
        }
        Ok(())
    }

    /// Reads a type tag followed by the value
    pub fn decode(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Self::decode_nested(src, 0)
    }

    fn decode_nested(src: &mut impl Buf, depth: usize) -> Result<Self, DecodeError> {
        let value = match get_u8(src)? {
            tag::BOOLEAN => FieldValue::Boolean(get_u8(src)? != 0),
            tag::SHORT_SHORT_INT => FieldValue::ShortShortInt(get_u8(src)? as i8),
            tag::SHORT_SHORT_UINT => FieldValue::ShortShortUInt(get_u8(src)?),
            tag::SHORT_INT => FieldValue::ShortInt(get_u16(src)? as i16),
            tag::SHORT_UINT => FieldValue::ShortUInt(get_u16(src)?),
            tag::LONG_INT => FieldValue::LongInt(get_u32(src)? as i32),
            tag::LONG_UINT => FieldValue::LongUInt(get_u32(src)?),
            tag::LONG_LONG_INT => FieldValue::LongLongInt(get_u64(src)? as i64),
            tag::FLOAT => FieldValue::Float(f32::from_bits(get_u32(src)?)),
            tag::DOUBLE => FieldValue::Double(f64::from_bits(get_u64(src)?)),
            tag::DECIMAL => {
                let scale = get_u8(src)?;
                let value = get_u32(src)?;
                FieldValue::Decimal(Decimal { scale, value })
            }
            tag::LONG_STRING => FieldValue::LongString(get_long_string(src)?),
            tag::BYTE_ARRAY => FieldValue::ByteArray(get_long_string(src)?),
            tag::FIELD_ARRAY => {
                let depth = nested(depth)?;
                let mut body = get_long_string(src)?;
                let mut values = Vec::new();
                while body.has_remaining() {
                    values.push(FieldValue::decode_nested(&mut body, depth)?);
                }
                FieldValue::FieldArray(values)
            }
            tag::TIMESTAMP => FieldValue::Timestamp(get_u64(src)?),
            tag::FIELD_TABLE => FieldValue::FieldTable(FieldTable::decode_nested(src, nested(depth)?)?),
            tag::VOID => FieldValue::Void,
            other => return Err(DecodeError::InvalidTypeTag(other)),
        };
        Ok(value)
    }
}

fn nested(depth: usize) -> Result<usize, DecodeError> {
    match depth + 1 {
        depth if depth > MAX_NESTING_DEPTH => Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH)),
        depth => Ok(depth),
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::LongInt(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::LongUInt(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::LongLongInt(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(Bytes::from(value))
    }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self {
        FieldValue::FieldTable(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::FieldArray(value)
    }
}

/// An ordered table of short-string keys to [`FieldValue`]s.
///
/// Lookups compare keys by exact byte content. When a decoded table repeats a key, the
/// first occurrence is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable(IndexMap<String, FieldValue>);

impl FieldTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the table contains no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value stored under exactly `key`
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Returns the value stored under exactly `key` mutably
    pub fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.0.get_mut(key)
    }

    /// Returns true if an entry with exactly `key` exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Inserts a value, returning the previous value stored under the same key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Inserts a value only if the key is not present yet
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Iterates over the entries in insertion order
    pub fn iter(&self) -> Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    /// Iterates over the keys in insertion order
    pub fn keys(&self) -> Keys<'_, String, FieldValue> {
        self.0.keys()
    }

    /// Iterates over the values in insertion order
    pub fn values(&self) -> Values<'_, String, FieldValue> {
        self.0.values()
    }

    /// Writes the table with its 32-bit byte length prefix
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let mut buf = BytesMut::new();
        for (key, value) in &self.0 {
            put_short_string(&mut buf, key)?;
            value.encode(&mut buf)?;
        }
        put_long_string(dst, &buf)
    }

    /// Reads a table with its 32-bit byte length prefix
    pub fn decode(src: &mut impl Buf) -> Result<Self, DecodeError> {
        Self::decode_nested(src, 0)
    }

    fn decode_nested(src: &mut impl Buf, depth: usize) -> Result<Self, DecodeError> {
        let len = get_u32(src)? as usize;
        ensure_remaining(src, len)?;
        let mut body = src.copy_to_bytes(len);

        let mut table = FieldTable::new();
        while body.has_remaining() {
            let key = get_short_string(&mut body)?;
            let value = FieldValue::decode_nested(&mut body, depth)?;
            table.insert_if_absent(key, value);
        }
        Ok(table)
    }
}

impl<K, V> FromIterator<(K, V)> for FieldTable
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a FieldTable {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::{primitives::Decimal, DecodeError};

    use super::{FieldTable, FieldValue, MAX_NESTING_DEPTH};

    #[test]
    fn encode_single_boolean_entry() {
        let table: FieldTable = [("a", true)].into_iter().collect();
        let mut buf = BytesMut::new();
        table.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 4, 1, b'a', b't', 1]);
    }

    #[test]
    fn nested_capabilities_table_layout() {
        let capabilities: FieldTable = [("consumer_cancel_notify", true)].into_iter().collect();
        let mut properties = FieldTable::new();
        properties.insert("capabilities", capabilities);

        let mut buf = BytesMut::new();
        properties.encode(&mut buf).unwrap();

        let mut expected = vec![0, 0, 0, 43, 12];
        expected.extend_from_slice(b"capabilities");
        expected.extend_from_slice(&[b'F', 0, 0, 0, 25, 22]);
        expected.extend_from_slice(b"consumer_cancel_notify");
        expected.extend_from_slice(&[b't', 1]);
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn decode_table_with_mixed_values() {
        let mut inner = FieldTable::new();
        inner.insert("publisher_confirms", true);

        let mut table = FieldTable::new();
        table.insert("product", "RabbitMQ");
        table.insert("version", "3.11.5");
        table.insert("capabilities", inner.clone());
        table.insert("count", FieldValue::ShortUInt(7));
        table.insert("delta", FieldValue::LongLongInt(-12));
        table.insert("ratio", FieldValue::Double(0.5));
        table.insert("price", FieldValue::Decimal(Decimal::new(2, 1999)));
        table.insert("list", vec![FieldValue::Boolean(false), FieldValue::Void]);
        table.insert("at", FieldValue::Timestamp(1_700_000_000));

        let mut buf = BytesMut::new();
        table.encode(&mut buf).unwrap();
        let decoded = FieldTable::decode(&mut buf.freeze()).unwrap();

        assert_eq!(decoded, table);
        assert_eq!(decoded.keys().next().map(String::as_str), Some("product"));
        assert_eq!(
            decoded.get("capabilities").and_then(FieldValue::as_table),
            Some(&inner)
        );
        assert_eq!(
            decoded.get("version").and_then(FieldValue::as_bytes),
            Some(&b"3.11.5"[..])
        );
    }

    #[test]
    fn repeated_key_keeps_first_occurrence() {
        let mut src = Bytes::from_static(&[
            0, 0, 0, 8, //
            1, b'k', b't', 1, //
            1, b'k', b't', 0,
        ]);
        let table = FieldTable::decode(&mut src).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("k"), Some(&FieldValue::Boolean(true)));
    }

    #[test]
    fn lookup_is_exact() {
        let table: FieldTable = [("Version", "1.0.0"), ("version_info", "x")]
            .into_iter()
            .collect();
        assert!(table.get("version").is_none());
    }

    #[test]
    fn unknown_type_tag_is_an_error() {
        let mut src = Bytes::from_static(&[0, 0, 0, 4, 1, b'k', b'?', 0]);
        assert_eq!(
            FieldTable::decode(&mut src),
            Err(DecodeError::InvalidTypeTag(b'?'))
        );
    }

    #[test]
    fn truncated_table_is_an_error() {
        let mut src = Bytes::from_static(&[0, 0, 0, 10, 1, b'k', b't']);
        assert!(matches!(
            FieldTable::decode(&mut src),
            Err(DecodeError::Incomplete { .. })
        ));

        // Entry cut short inside the declared length
        let mut src = Bytes::from_static(&[0, 0, 0, 3, 1, b'k', b'I']);
        assert!(matches!(
            FieldTable::decode(&mut src),
            Err(DecodeError::Incomplete { .. })
        ));
    }

    #[test]
    fn deeply_nested_tables_are_rejected() {
        let mut value = FieldValue::Boolean(true);
        for _ in 0..(MAX_NESTING_DEPTH + 1) {
            value = FieldValue::FieldTable([("n", value)].into_iter().collect());
        }
        let table: FieldTable = [("root", value)].into_iter().collect();

        let mut buf = BytesMut::new();
        table.encode(&mut buf).unwrap();
        assert_eq!(
            FieldTable::decode(&mut buf.freeze()),
            Err(DecodeError::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }
}
