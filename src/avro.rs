//! Avro binary encoding primitives.
//!
//! This is deliberately not a general schema-resolution engine: the wire
//! format used by `AvroSourceProtocol` only ever needs the primitives listed
//! in the design (`string`, `bytes`, `boolean`, `enum`, `union`, `fixed`,
//! and maps of those), so this module hand-encodes exactly those. The
//! `Encode`/`Decode` traits below mirror how `sqlx_core::io::Encode`/
//! `io::Decode` encode fixed wire shapes in that crate's protocol modules,
//! rather than pulling in a generic codec.

use crate::error::Error;

/// Encodes a value into an existing byte buffer.
///
/// Mirrors `sqlx_core::io::Encode`: no return value, just appends to `buf`.
pub trait Encode {
    fn encode(&self, buf: &mut Vec<u8>);
}

/// Decodes a value from the front of a cursor, advancing it past the bytes
/// consumed.
///
/// Mirrors `sqlx_core::io::Decode`, specialized to a plain `&[u8]` cursor
/// since every value here is self-delimiting.
pub trait Decode<'de>: Sized {
    fn decode(buf: &mut &'de [u8]) -> Result<Self, Error>;
}

/// Avro `long`/`int` use a zig-zag varint encoding; every length, enum
/// index, and union branch tag in this protocol rides on it.
pub fn encode_long(value: i64, buf: &mut Vec<u8>) {
    let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
    loop {
        let mut byte = (zigzag & 0x7f) as u8;
        zigzag >>= 7;
        if zigzag != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if zigzag == 0 {
            break;
        }
    }
}

pub fn decode_long(buf: &mut &[u8]) -> Result<i64, Error> {
    let mut zigzag: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .first()
            .ok_or_else(|| Error::codec("short buffer: expected varint continuation"))?;
        *buf = &buf[1..];

        zigzag |= u64::from(byte & 0x7f) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
        if shift >= 64 {
            return Err(Error::codec("varint too long"));
        }
    }

    Ok(((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64))
}

pub fn encode_boolean(value: bool, buf: &mut Vec<u8>) {
    buf.push(if value { 0x01 } else { 0x00 });
}

pub fn decode_boolean(buf: &mut &[u8]) -> Result<bool, Error> {
    let byte = *buf
        .first()
        .ok_or_else(|| Error::codec("short buffer: expected boolean"))?;
    *buf = &buf[1..];

    match byte {
        0x00 => Ok(false),
        0x01 => Ok(true),
        other => Err(Error::codec(format!(
            "cannot decode binary boolean: invalid byte 0x{:02X}",
            other
        ))),
    }
}

pub fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    encode_long(bytes.len() as i64, buf);
    buf.extend_from_slice(bytes);
}

pub fn decode_bytes(buf: &mut &[u8]) -> Result<Vec<u8>, Error> {
    let len = decode_long(buf)?;
    let len = usize::try_from(len).map_err(|_| Error::codec("negative bytes length"))?;

    if buf.len() < len {
        return Err(Error::codec(format!(
            "short buffer: expected {} bytes, have {}",
            len,
            buf.len()
        )));
    }

    let (value, rest) = buf.split_at(len);
    *buf = rest;
    Ok(value.to_vec())
}

pub fn encode_string(s: &str, buf: &mut Vec<u8>) {
    encode_bytes(s.as_bytes(), buf);
}

pub fn decode_string(buf: &mut &[u8]) -> Result<String, Error> {
    let bytes = decode_bytes(buf)?;
    String::from_utf8(bytes).map_err(|e| Error::codec(format!("invalid utf-8 string: {}", e)))
}

/// `fixed(n)`: raw bytes, no length prefix.
pub fn encode_fixed(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes);
}

pub fn decode_fixed(buf: &mut &[u8], n: usize) -> Result<Vec<u8>, Error> {
    if buf.len() < n {
        return Err(Error::codec(format!(
            "short buffer: expected fixed({}), have {}",
            n,
            buf.len()
        )));
    }
    let (value, rest) = buf.split_at(n);
    *buf = rest;
    Ok(value.to_vec())
}

/// `enum`: a zig-zag varint symbol index.
pub fn encode_enum_index(index: u64, buf: &mut Vec<u8>) {
    encode_long(index as i64, buf);
}

pub fn decode_enum_index(buf: &mut &[u8]) -> Result<u64, Error> {
    let index = decode_long(buf)?;
    u64::try_from(index).map_err(|_| Error::codec("negative enum index"))
}

/// `union`: a zig-zag varint branch index; the branch value follows and is
/// decoded by the caller once it knows which branch won.
pub fn encode_union_index(index: u64, buf: &mut Vec<u8>) {
    encode_long(index as i64, buf);
}

pub fn decode_union_index(buf: &mut &[u8]) -> Result<u64, Error> {
    let index = decode_long(buf)?;
    u64::try_from(index).map_err(|_| Error::codec("negative union branch index"))
}

/// Encodes an Avro map whose values are written by `encode_value`. Maps are
/// a sequence of count-prefixed blocks terminated by a zero-count block; an
/// empty map is therefore a single `0x00` byte.
pub fn encode_map<'a, V: 'a>(
    entries: impl ExactSizeIterator<Item = (&'a str, V)>,
    buf: &mut Vec<u8>,
    mut encode_value: impl FnMut(V, &mut Vec<u8>),
) {
    if entries.len() > 0 {
        encode_long(entries.len() as i64, buf);
        for (key, value) in entries {
            encode_string(key, buf);
            encode_value(value, buf);
        }
    }
    // Terminating empty block (and the entire encoding when the map was
    // empty to begin with).
    encode_long(0, buf);
}

/// A dynamically-typed Avro value, used where the shape being built is a
/// tree (event records, nested maps) rather than a single primitive.
///
/// This is not a general Avro value type: there is no `Int`/`Long`/`Float`
/// distinction because nothing this client sends or receives needs one, and
/// `Null` only exists to fill the first branch of the optional-field unions
/// used in the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Bytes(Vec<u8>),
    String(String),
    Fixed(Vec<u8>),
    Enum(u64),
    Union(u64, Box<Value>),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
    Record(Vec<(String, Value)>),
}

/// Encodes a [`Value`] tree. `Record` fields and `Map`/`Array` elements are
/// written in the order given, matching how the schema that produced the
/// tree laid them out.
pub fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => {}
        Value::Boolean(b) => encode_boolean(*b, buf),
        Value::Bytes(b) => encode_bytes(b, buf),
        Value::String(s) => encode_string(s, buf),
        Value::Fixed(b) => encode_fixed(b, buf),
        Value::Enum(index) => encode_enum_index(*index, buf),
        Value::Union(index, inner) => {
            encode_union_index(*index, buf);
            encode_value(inner, buf);
        }
        Value::Array(items) => {
            if !items.is_empty() {
                encode_long(items.len() as i64, buf);
                for item in items {
                    encode_value(item, buf);
                }
            }
            encode_long(0, buf);
        }
        Value::Map(entries) => {
            if !entries.is_empty() {
                encode_long(entries.len() as i64, buf);
                for (key, value) in entries {
                    encode_string(key, buf);
                    encode_value(value, buf);
                }
            }
            encode_long(0, buf);
        }
        Value::Record(fields) => {
            for (_, value) in fields {
                encode_value(value, buf);
            }
        }
    }
}

/// Decodes an Avro `map<bytes>`, following however many count blocks the
/// encoder produced.
pub fn decode_map_bytes(buf: &mut &[u8]) -> Result<Vec<(String, Vec<u8>)>, Error> {
    let mut entries = Vec::new();

    loop {
        let count = decode_long(buf)?;
        if count == 0 {
            break;
        }

        // A negative count is followed by its absolute value and then a
        // byte-count of the block, which Avro permits so readers can skip
        // blocks of an unknown type; this protocol never emits one, so
        // encountering it is treated as a codec error rather than silently
        // skipped.
        if count < 0 {
            return Err(Error::codec(
                "negative map block count is not supported by this codec",
            ));
        }

        for _ in 0..count {
            let key = decode_string(buf)?;
            let value = decode_bytes(buf)?;
            entries.push((key, value));
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_roundtrip() {
        for value in [0_i64, 1, -1, 64, -64, 1_000_000, -1_000_000, i64::MAX, i64::MIN] {
            let mut buf = Vec::new();
            encode_long(value, &mut buf);
            let mut cursor = buf.as_slice();
            assert_eq!(decode_long(&mut cursor).unwrap(), value);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn boolean_rejects_other_bytes() {
        let mut cursor: &[u8] = &[0x02];
        let err = decode_boolean(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("cannot decode binary boolean"));
    }

    #[test]
    fn bytes_roundtrip() {
        let mut buf = Vec::new();
        encode_bytes(b"tttt", &mut buf);
        assert_eq!(buf, vec![0x08, b't', b't', b't', b't']);
        let mut cursor = buf.as_slice();
        assert_eq!(decode_bytes(&mut cursor).unwrap(), b"tttt".to_vec());
    }

    #[test]
    fn empty_map_is_single_zero_byte() {
        let mut buf = Vec::new();
        encode_map(std::iter::empty::<(&str, &[u8])>(), &mut buf, |v, b| {
            encode_bytes(v, b)
        });
        assert_eq!(buf, vec![0x00]);
    }

    #[test]
    fn map_bytes_roundtrip() {
        let mut buf = Vec::new();
        let items: Vec<(&str, &[u8])> = vec![("a", b"1"), ("b", b"22")];
        encode_map(items.into_iter(), &mut buf, |v, b| encode_bytes(v, b));
        let mut cursor = buf.as_slice();
        let decoded = decode_map_bytes(&mut cursor).unwrap();
        assert_eq!(
            decoded,
            vec![
                ("a".to_string(), b"1".to_vec()),
                ("b".to_string(), b"22".to_vec())
            ]
        );
    }

    #[test]
    fn short_buffer_error() {
        let mut cursor: &[u8] = &[0x08];
        let err = decode_bytes(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("short buffer"));
    }
}
