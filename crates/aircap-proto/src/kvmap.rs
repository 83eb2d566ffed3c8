//! Self-describing named-map codec for keyed-object payloads.
//!
//! Map- and array-typed keyed objects carry their contents in this encoding:
//! a tagged, big-endian, self-describing format with seven primitives. Each
//! value is one tag byte followed by its body:
//!
//! ```text
//! 0x01 string   u32 length | UTF-8 bytes
//! 0x02 unsigned u64
//! 0x03 signed   i64
//! 0x04 float    f64 (IEEE 754 bits)
//! 0x05 binary   u32 length | bytes
//! 0x06 array    u32 count  | values
//! 0x07 map      u32 count  | (u32 key-length | UTF-8 key | value) entries
//! ```
//!
//! Map keys are UTF-8 strings; nesting depth is capped to keep decoding of
//! hostile input bounded. Decoders elsewhere consume this module through
//! [`decode_map`] / [`decode_array`] and the lenient numeric accessors on
//! [`Value`].

use std::collections::BTreeMap;

use aircap_core::{Error, Result};

/// Maximum value nesting depth accepted by the decoder.
const MAX_DEPTH: usize = 32;

const TAG_STRING: u8 = 0x01;
const TAG_UNSIGNED: u8 = 0x02;
const TAG_SIGNED: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_BINARY: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;
const TAG_MAP: u8 = 0x07;

/// One decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string.
    String(String),
    /// Unsigned 64-bit integer.
    UInt(u64),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// String-keyed map of values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an unsigned integer. Signed values convert when
    /// non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// The value as a signed integer. Unsigned values convert when in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// The value as an `i32`, if integral and in range.
    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    /// The value as a float. Integers convert losslessly enough for the
    /// rates and coordinates carried by this protocol.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The raw bytes, if this is a binary value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// The entries, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Append the encoding of `value` to `out`.
pub fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::String(s) => {
            out.push(TAG_STRING);
            out.extend_from_slice(&(s.len() as u32).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::UInt(v) => {
            out.push(TAG_UNSIGNED);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Int(v) => {
            out.push(TAG_SIGNED);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Bytes(b) => {
            out.push(TAG_BINARY);
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(b);
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                encode_value(item, out);
            }
        }
        Value::Map(entries) => {
            out.push(TAG_MAP);
            out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
            for (key, item) in entries {
                out.extend_from_slice(&(key.len() as u32).to_be_bytes());
                out.extend_from_slice(key.as_bytes());
                encode_value(item, out);
            }
        }
    }
}

/// Encode a string-keyed map as a standalone payload.
pub fn encode_map(entries: &BTreeMap<String, Value>) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value(&Value::Map(entries.clone()), &mut out);
    out
}

/// Decode one value from the front of `buf`, returning it and the number of
/// bytes consumed.
pub fn decode_value(buf: &[u8]) -> Result<(Value, usize)> {
    decode_at(buf, 0, 0)
}

/// Decode a payload that must be a single map with nothing trailing.
pub fn decode_map(buf: &[u8]) -> Result<BTreeMap<String, Value>> {
    let (value, consumed) = decode_value(buf)?;
    if consumed != buf.len() {
        return Err(Error::Decode("trailing bytes after map".into()));
    }
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(Error::Decode(format!(
            "expected map, found {}",
            type_name(&other)
        ))),
    }
}

/// Decode a payload that must be a single array with nothing trailing.
pub fn decode_array(buf: &[u8]) -> Result<Vec<Value>> {
    let (value, consumed) = decode_value(buf)?;
    if consumed != buf.len() {
        return Err(Error::Decode("trailing bytes after array".into()));
    }
    match value {
        Value::Array(items) => Ok(items),
        other => Err(Error::Decode(format!(
            "expected array, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::UInt(_) => "unsigned",
        Value::Int(_) => "signed",
        Value::Float(_) => "float",
        Value::Bytes(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
    }
}

/// Decode the value starting at `offset`; returns the value and the offset
/// one past its end.
fn decode_at(buf: &[u8], offset: usize, depth: usize) -> Result<(Value, usize)> {
    if depth > MAX_DEPTH {
        return Err(Error::Decode("value nesting too deep".into()));
    }

    let tag = *buf
        .get(offset)
        .ok_or_else(|| Error::Decode("truncated value".into()))?;
    let mut pos = offset + 1;

    match tag {
        TAG_STRING => {
            let raw = read_len_prefixed(buf, &mut pos)?;
            let s = std::str::from_utf8(raw)
                .map_err(|_| Error::Decode("invalid UTF-8 in string".into()))?;
            Ok((Value::String(s.to_string()), pos))
        }
        TAG_UNSIGNED => {
            let v = u64::from_be_bytes(read_fixed::<8>(buf, &mut pos)?);
            Ok((Value::UInt(v), pos))
        }
        TAG_SIGNED => {
            let v = i64::from_be_bytes(read_fixed::<8>(buf, &mut pos)?);
            Ok((Value::Int(v), pos))
        }
        TAG_FLOAT => {
            let v = f64::from_be_bytes(read_fixed::<8>(buf, &mut pos)?);
            Ok((Value::Float(v), pos))
        }
        TAG_BINARY => {
            let raw = read_len_prefixed(buf, &mut pos)?;
            Ok((Value::Bytes(raw.to_vec()), pos))
        }
        TAG_ARRAY => {
            let count = u32::from_be_bytes(read_fixed::<4>(buf, &mut pos)?) as usize;
            let mut items = Vec::new();
            for _ in 0..count {
                let (item, next) = decode_at(buf, pos, depth + 1)?;
                items.push(item);
                pos = next;
            }
            Ok((Value::Array(items), pos))
        }
        TAG_MAP => {
            let count = u32::from_be_bytes(read_fixed::<4>(buf, &mut pos)?) as usize;
            let mut entries = BTreeMap::new();
            for _ in 0..count {
                let raw_key = read_len_prefixed(buf, &mut pos)?;
                let key = std::str::from_utf8(raw_key)
                    .map_err(|_| Error::Decode("invalid UTF-8 in map key".into()))?
                    .to_string();
                let (item, next) = decode_at(buf, pos, depth + 1)?;
                entries.insert(key, item);
                pos = next;
            }
            Ok((Value::Map(entries), pos))
        }
        other => Err(Error::Decode(format!("unknown value tag {other:#04x}"))),
    }
}

fn read_fixed<const N: usize>(buf: &[u8], pos: &mut usize) -> Result<[u8; N]> {
    let end = pos
        .checked_add(N)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::Decode("truncated value".into()))?;
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[*pos..end]);
    *pos = end;
    Ok(out)
}

fn read_len_prefixed<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = u32::from_be_bytes(read_fixed::<4>(buf, pos)?) as usize;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::Decode("truncated value".into()))?;
    let raw = &buf[*pos..end];
    *pos = end;
    Ok(raw)
}
