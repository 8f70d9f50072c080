//! Self-describing value encoding for structured sub-payloads.
//!
//! Keyed objects that carry structured data (messages, channel lists, hop
//! configs, packets, radio and geo metadata) use a tagged, length-prefixed
//! encoding of typed primitives, strings, arrays, and string-keyed maps.
//! All integers are big-endian, matching the outer frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

const TAG_U64: u8 = 0x01;
const TAG_I64: u8 = 0x02;
const TAG_F64: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BIN: u8 = 0x05;
const TAG_ARR: u8 = 0x06;
const TAG_MAP: u8 = 0x07;

/// Maximum nesting depth accepted by the decoder.
pub const MAX_VALUE_DEPTH: usize = 32;

/// Errors from the structured value codec.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("truncated value")]
    Truncated,

    #[error("unknown value tag {0:#04x}")]
    UnknownTag(u8),

    #[error("value nesting exceeds {MAX_VALUE_DEPTH} levels")]
    TooDeep,

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("trailing bytes after value")]
    TrailingBytes,

    #[error("missing '{0}' entry")]
    Missing(&'static str),

    #[error("'{field}' entry is not a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

/// A decoded structured value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Bin(Bytes),
    Array(Vec<Value>),
    /// String-keyed entries in wire order. Duplicate keys resolve
    /// last-write-wins, matching the keyed-object table policy.
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Decode a complete value; trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Value, ValueError> {
        let mut buf = bytes;
        let value = decode_value(&mut buf, 0)?;
        if buf.has_remaining() {
            return Err(ValueError::TrailingBytes);
        }
        Ok(value)
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        encode_value(self, dst);
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.freeze()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(v) => Some(v),
            Value::Int(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::UInt(v) if v <= i64::MAX as u64 => Some(v as i64),
            _ => None,
        }
    }

    /// Numeric accessor with integer coercion, the way schemaless decoders
    /// usually hand back doubles.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            Value::UInt(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_bin(&self) -> Option<&[u8]> {
        match self {
            Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Map lookup; with duplicate keys the last entry wins.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

fn decode_value(buf: &mut &[u8], depth: usize) -> Result<Value, ValueError> {
    if depth >= MAX_VALUE_DEPTH {
        return Err(ValueError::TooDeep);
    }
    if buf.remaining() < 1 {
        return Err(ValueError::Truncated);
    }

    let tag = buf.get_u8();
    match tag {
        TAG_U64 => {
            ensure(buf.remaining(), 8)?;
            Ok(Value::UInt(buf.get_u64()))
        }
        TAG_I64 => {
            ensure(buf.remaining(), 8)?;
            Ok(Value::Int(buf.get_i64()))
        }
        TAG_F64 => {
            ensure(buf.remaining(), 8)?;
            Ok(Value::Float(buf.get_f64()))
        }
        TAG_STR => Ok(Value::Str(decode_string(buf)?)),
        TAG_BIN => {
            let raw = decode_len_prefixed(buf)?;
            Ok(Value::Bin(Bytes::copy_from_slice(raw)))
        }
        TAG_ARR => {
            ensure(buf.remaining(), 4)?;
            let count = buf.get_u32() as usize;
            let mut items = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                items.push(decode_value(buf, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        TAG_MAP => {
            ensure(buf.remaining(), 4)?;
            let count = buf.get_u32() as usize;
            let mut entries = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let key = decode_string(buf)?;
                let value = decode_value(buf, depth + 1)?;
                entries.push((key, value));
            }
            Ok(Value::Map(entries))
        }
        other => Err(ValueError::UnknownTag(other)),
    }
}

fn decode_string(buf: &mut &[u8]) -> Result<String, ValueError> {
    let raw = decode_len_prefixed(buf)?;
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| ValueError::InvalidUtf8)
}

fn decode_len_prefixed<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], ValueError> {
    ensure(buf.remaining(), 4)?;
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ValueError::Truncated);
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn ensure(remaining: usize, needed: usize) -> Result<(), ValueError> {
    if remaining < needed {
        return Err(ValueError::Truncated);
    }
    Ok(())
}

fn encode_value(value: &Value, dst: &mut BytesMut) {
    match value {
        Value::UInt(v) => {
            dst.put_u8(TAG_U64);
            dst.put_u64(*v);
        }
        Value::Int(v) => {
            dst.put_u8(TAG_I64);
            dst.put_i64(*v);
        }
        Value::Float(v) => {
            dst.put_u8(TAG_F64);
            dst.put_f64(*v);
        }
        Value::Str(s) => {
            dst.put_u8(TAG_STR);
            encode_string(s, dst);
        }
        Value::Bin(b) => {
            dst.put_u8(TAG_BIN);
            dst.put_u32(b.len() as u32);
            dst.put_slice(b);
        }
        Value::Array(items) => {
            dst.put_u8(TAG_ARR);
            dst.put_u32(items.len() as u32);
            for item in items {
                encode_value(item, dst);
            }
        }
        Value::Map(entries) => {
            dst.put_u8(TAG_MAP);
            dst.put_u32(entries.len() as u32);
            for (key, value) in entries {
                encode_string(key, dst);
                encode_value(value, dst);
            }
        }
    }
}

fn encode_string(s: &str, dst: &mut BytesMut) {
    dst.put_u32(s.len() as u32);
    dst.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrips() {
        for value in [
            Value::UInt(u64::MAX),
            Value::Int(-40),
            Value::Float(5.5),
            Value::str("channel 6"),
            Value::Bin(Bytes::from_static(&[0xDE, 0xAD])),
        ] {
            let decoded = Value::decode(&value.to_bytes()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn nested_map_roundtrip() {
        let value = Value::Map(vec![
            ("rate".to_string(), Value::Float(5.0)),
            (
                "channels".to_string(),
                Value::Array(vec![Value::str("1"), Value::str("6"), Value::str("11")]),
            ),
        ]);

        let decoded = Value::decode(&value.to_bytes()).unwrap();
        assert_eq!(decoded.get("rate").unwrap().as_f64(), Some(5.0));
        assert_eq!(decoded.get("channels").unwrap().as_array().unwrap().len(), 3);
    }

    #[test]
    fn duplicate_map_keys_last_wins() {
        let value = Value::Map(vec![
            ("msg".to_string(), Value::str("first")),
            ("msg".to_string(), Value::str("second")),
        ]);
        assert_eq!(value.get("msg").unwrap().as_str(), Some("second"));
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = Value::str("truncate me").to_bytes();
        for len in 0..bytes.len() {
            assert!(Value::decode(&bytes[..len]).is_err());
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = BytesMut::from(Value::UInt(1).to_bytes().as_ref());
        bytes.put_u8(0);
        assert!(matches!(
            Value::decode(&bytes),
            Err(ValueError::TrailingBytes)
        ));
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(matches!(
            Value::decode(&[0x7F]),
            Err(ValueError::UnknownTag(0x7F))
        ));
    }

    #[test]
    fn depth_limit_enforced() {
        let mut bytes = BytesMut::new();
        for _ in 0..MAX_VALUE_DEPTH + 1 {
            bytes.put_u8(0x06); // array
            bytes.put_u32(1);
        }
        bytes.put_u8(0x01);
        bytes.put_u64(0);

        assert!(matches!(Value::decode(&bytes), Err(ValueError::TooDeep)));
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::UInt(3).as_i64(), Some(3));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::str("3").as_f64(), None);
    }
}
