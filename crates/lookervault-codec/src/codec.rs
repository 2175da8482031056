use crate::error::CodecError;
use crate::value::Value;
use crate::varint;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STR: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_MAP: u8 = 7;

/// Encodes and decodes [`Value`] trees to a deterministic byte format.
///
/// Implementations must guarantee bit-exact round-trip fidelity (shape, key
/// order, numeric type) and must never execute code while decoding.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// `true` iff `decode(bytes)` would succeed.
    fn validate(&self, bytes: &[u8]) -> bool {
        self.decode(bytes).is_ok()
    }
}

/// Hand-rolled tagged length-prefixed encoding. Deliberately not built on a
/// generic `serde` format: those typically serialize maps through
/// `HashMap`, which does not preserve insertion order, and several support
/// arbitrary trait-object deserialization that this format must avoid.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinCodec;

impl BinCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_value(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match value {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_be_bytes());
            }
            Value::Float(f) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&f.to_be_bytes());
            }
            Value::Str(s) => {
                out.push(TAG_STR);
                let bytes = s.as_bytes();
                varint::write(out, bytes.len() as u64);
                out.extend_from_slice(bytes);
            }
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                varint::write(out, b.len() as u64);
                out.extend_from_slice(b);
            }
            Value::Array(items) => {
                out.push(TAG_ARRAY);
                varint::write(out, items.len() as u64);
                for item in items {
                    self.encode_value(item, out)?;
                }
            }
            Value::Map(entries) => {
                out.push(TAG_MAP);
                varint::write(out, entries.len() as u64);
                for (key, val) in entries {
                    let key_bytes = key.as_bytes();
                    varint::write(out, key_bytes.len() as u64);
                    out.extend_from_slice(key_bytes);
                    self.encode_value(val, out)?;
                }
            }
        }
        Ok(())
    }

    fn decode_value<'a>(&self, bytes: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| CodecError::DeserializationError("empty input".to_string()))?;
        match tag {
            TAG_NULL => Ok((Value::Null, rest)),
            TAG_BOOL => {
                let (&b, rest) = rest
                    .split_first()
                    .ok_or_else(|| CodecError::DeserializationError("truncated bool".to_string()))?;
                Ok((Value::Bool(b != 0), rest))
            }
            TAG_INT => {
                let (head, rest) = take(rest, 8)?;
                let arr: [u8; 8] = head.try_into().unwrap();
                Ok((Value::Int(i64::from_be_bytes(arr)), rest))
            }
            TAG_FLOAT => {
                let (head, rest) = take(rest, 8)?;
                let arr: [u8; 8] = head.try_into().unwrap();
                Ok((Value::Float(f64::from_be_bytes(arr)), rest))
            }
            TAG_STR => {
                let (len, rest) = varint::read(rest)?;
                let (head, rest) = take(rest, len as usize)?;
                let s = String::from_utf8(head.to_vec())
                    .map_err(|e| CodecError::DeserializationError(e.to_string()))?;
                Ok((Value::Str(s), rest))
            }
            TAG_BYTES => {
                let (len, rest) = varint::read(rest)?;
                let (head, rest) = take(rest, len as usize)?;
                Ok((Value::Bytes(head.to_vec()), rest))
            }
            TAG_ARRAY => {
                let (count, mut rest) = varint::read(rest)?;
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let (item, next) = self.decode_value(rest)?;
                    items.push(item);
                    rest = next;
                }
                Ok((Value::Array(items), rest))
            }
            TAG_MAP => {
                let (count, mut rest) = varint::read(rest)?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let (key_len, after_len) = varint::read(rest)?;
                    let (key_bytes, after_key) = take(after_len, key_len as usize)?;
                    let key = String::from_utf8(key_bytes.to_vec())
                        .map_err(|e| CodecError::DeserializationError(e.to_string()))?;
                    let (val, after_val) = self.decode_value(after_key)?;
                    entries.push((key, val));
                    rest = after_val;
                }
                Ok((Value::Map(entries), rest))
            }
            other => Err(CodecError::DeserializationError(format!(
                "unknown tag byte {other}"
            ))),
        }
    }
}

fn take(bytes: &[u8], n: usize) -> Result<(&[u8], &[u8]), CodecError> {
    if bytes.len() < n {
        return Err(CodecError::DeserializationError(
            "unexpected end of blob".to_string(),
        ));
    }
    Ok(bytes.split_at(n))
}

impl Codec for BinCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode_value(value, &mut out)?;
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let (value, rest) = self.decode_value(bytes)?;
        if !rest.is_empty() {
            return Err(CodecError::DeserializationError(
                "trailing bytes after value".to_string(),
            ));
        }
        Ok(value)
    }
}
