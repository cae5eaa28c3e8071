//! Key types and key values for OakDB indexes.

use crate::page::ObjectId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Type of the keys stored in an index.
///
/// The key type decides the page representation: fixed-width types use
/// scalar pages, strings and byte arrays use variable-length pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    Boolean = 0,
    Byte = 1,
    Char = 2,
    Short = 3,
    Int = 4,
    Long = 5,
    Float = 6,
    Double = 7,
    Object = 8,
    Enum = 9,
    Date = 10,
    String = 20,
    ByteArray = 21,
}

impl KeyType {
    /// Returns the fixed byte width for scalar keys, or None for variable-length keys.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            KeyType::Boolean | KeyType::Byte => Some(1),
            KeyType::Char | KeyType::Short => Some(2),
            KeyType::Int | KeyType::Float | KeyType::Object | KeyType::Enum => Some(4),
            KeyType::Long | KeyType::Double | KeyType::Date => Some(8),
            KeyType::String | KeyType::ByteArray => None,
        }
    }

    /// Returns true if keys of this type have a fixed width.
    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Returns the type name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            KeyType::Boolean => "Boolean",
            KeyType::Byte => "Byte",
            KeyType::Char => "Char",
            KeyType::Short => "Short",
            KeyType::Int => "Int",
            KeyType::Long => "Long",
            KeyType::Float => "Float",
            KeyType::Double => "Double",
            KeyType::Object => "Object",
            KeyType::Enum => "Enum",
            KeyType::Date => "Date",
            KeyType::String => "String",
            KeyType::ByteArray => "ByteArray",
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed key value.
///
/// String keys are kept as UTF-16 code units, which is also their on-page
/// representation. Dates are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ObjectId),
    Enum(i32),
    Date(i64),
    Str(Vec<u16>),
    Bytes(Bytes),
}

impl Key {
    /// Returns the key type of this value.
    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Boolean(_) => KeyType::Boolean,
            Key::Byte(_) => KeyType::Byte,
            Key::Char(_) => KeyType::Char,
            Key::Short(_) => KeyType::Short,
            Key::Int(_) => KeyType::Int,
            Key::Long(_) => KeyType::Long,
            Key::Float(_) => KeyType::Float,
            Key::Double(_) => KeyType::Double,
            Key::Object(_) => KeyType::Object,
            Key::Enum(_) => KeyType::Enum,
            Key::Date(_) => KeyType::Date,
            Key::Str(_) => KeyType::String,
            Key::Bytes(_) => KeyType::ByteArray,
        }
    }

    /// Creates a string key from UTF-8 text.
    pub fn string(s: &str) -> Self {
        Key::Str(s.encode_utf16().collect())
    }

    /// Number of length units of a variable-length key (0 for scalars).
    pub fn var_len(&self) -> usize {
        match self {
            Key::Str(units) => units.len(),
            Key::Bytes(bytes) => bytes.len(),
            _ => 0,
        }
    }

    /// Number of heap bytes a variable-length key occupies (0 for scalars).
    pub fn var_byte_len(&self) -> usize {
        match self {
            Key::Str(units) => units.len() * 2,
            Key::Bytes(bytes) => bytes.len(),
            _ => 0,
        }
    }

    /// Writes a scalar key into `buf` (little-endian, `buf.len()` == width).
    ///
    /// Panics when called on a variable-length key or with a buffer of the
    /// wrong width; both are programming errors.
    pub fn encode_scalar(&self, buf: &mut [u8]) {
        match self {
            Key::Boolean(v) => buf[0] = *v as u8,
            Key::Byte(v) => buf[0] = *v as u8,
            Key::Char(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Key::Short(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Key::Int(v) | Key::Enum(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Key::Long(v) | Key::Date(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Key::Float(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Key::Double(v) => buf.copy_from_slice(&v.to_le_bytes()),
            Key::Object(oid) => buf.copy_from_slice(&oid.0.to_le_bytes()),
            Key::Str(_) | Key::Bytes(_) => {
                panic!(
                    "encode_scalar called on variable-length key {:?}",
                    self.key_type()
                )
            }
        }
    }

    /// Reads a scalar key of the given type from `buf`.
    pub fn decode_scalar(key_type: KeyType, buf: &[u8]) -> Key {
        match key_type {
            KeyType::Boolean => Key::Boolean(buf[0] != 0),
            KeyType::Byte => Key::Byte(buf[0] as i8),
            KeyType::Char => Key::Char(u16::from_le_bytes([buf[0], buf[1]])),
            KeyType::Short => Key::Short(i16::from_le_bytes([buf[0], buf[1]])),
            KeyType::Int => Key::Int(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            KeyType::Enum => Key::Enum(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            KeyType::Float => Key::Float(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
            KeyType::Object => Key::Object(ObjectId(u32::from_le_bytes([
                buf[0], buf[1], buf[2], buf[3],
            ]))),
            KeyType::Long => Key::Long(i64::from_le_bytes(read8(buf))),
            KeyType::Date => Key::Date(i64::from_le_bytes(read8(buf))),
            KeyType::Double => Key::Double(f64::from_le_bytes(read8(buf))),
            KeyType::String | KeyType::ByteArray => {
                panic!("decode_scalar called for variable-length type {key_type}")
            }
        }
    }

    /// Writes the heap image of a variable-length key into `buf`.
    ///
    /// `buf.len()` must equal `var_byte_len()`.
    pub fn encode_var(&self, buf: &mut [u8]) {
        match self {
            Key::Str(units) => {
                for (chunk, unit) in buf.chunks_exact_mut(2).zip(units) {
                    chunk.copy_from_slice(&unit.to_le_bytes());
                }
            }
            Key::Bytes(bytes) => buf.copy_from_slice(bytes),
            _ => panic!("encode_var called on scalar key {:?}", self.key_type()),
        }
    }

    /// Rebuilds a variable-length key from its heap image.
    pub fn decode_var(key_type: KeyType, buf: &[u8]) -> Key {
        match key_type {
            KeyType::String => Key::Str(
                buf.chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            KeyType::ByteArray => Key::Bytes(Bytes::copy_from_slice(buf)),
            other => panic!("decode_var called for scalar type {other}"),
        }
    }

    /// Returns the string content of a string key, replacing unpaired surrogates.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Key::Str(units) => Some(String::from_utf16_lossy(units)),
            _ => None,
        }
    }
}

#[inline]
fn read8(buf: &[u8]) -> [u8; 8] {
    [buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]]
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::string(s)
    }
}

impl From<bool> for Key {
    fn from(v: bool) -> Self {
        Key::Boolean(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Int(v)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Long(v)
    }
}

impl From<f64> for Key {
    fn from(v: f64) -> Self {
        Key::Double(v)
    }
}

impl From<&[u8]> for Key {
    fn from(v: &[u8]) -> Self {
        Key::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key::Bytes(Bytes::from(v))
    }
}

impl From<ObjectId> for Key {
    fn from(v: ObjectId) -> Self {
        Key::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(KeyType::Boolean.fixed_size(), Some(1));
        assert_eq!(KeyType::Char.fixed_size(), Some(2));
        assert_eq!(KeyType::Object.fixed_size(), Some(4));
        assert_eq!(KeyType::Date.fixed_size(), Some(8));
        assert_eq!(KeyType::String.fixed_size(), None);
        assert!(!KeyType::ByteArray.is_fixed_size());
    }

    #[test]
    fn test_scalar_encode_decode() {
        let keys = [
            Key::Boolean(true),
            Key::Byte(-3),
            Key::Char(0x4e2d),
            Key::Short(-1234),
            Key::Int(i32::MIN),
            Key::Long(1 << 40),
            Key::Float(1.5),
            Key::Double(-0.25),
            Key::Object(ObjectId(99)),
            Key::Enum(3),
            Key::Date(1_700_000_000_000),
        ];
        for key in keys {
            let kt = key.key_type();
            let mut buf = vec![0u8; kt.fixed_size().unwrap()];
            key.encode_scalar(&mut buf);
            assert_eq!(Key::decode_scalar(kt, &buf), key);
        }
    }

    #[test]
    fn test_string_key_is_utf16() {
        let key = Key::from("héllo");
        assert_eq!(key.var_len(), 5);
        assert_eq!(key.var_byte_len(), 10);

        let mut buf = vec![0u8; key.var_byte_len()];
        key.encode_var(&mut buf);
        assert_eq!(&buf[0..2], &(b'h' as u16).to_le_bytes());
        assert_eq!(Key::decode_var(KeyType::String, &buf), key);
        assert_eq!(key.as_string().as_deref(), Some("héllo"));
    }

    #[test]
    fn test_byte_array_key() {
        let key = Key::from(&b"\x00\xffab"[..]);
        assert_eq!(key.key_type(), KeyType::ByteArray);
        assert_eq!(key.var_len(), 4);
        let mut buf = vec![0u8; 4];
        key.encode_var(&mut buf);
        assert_eq!(Key::decode_var(KeyType::ByteArray, &buf), key);
    }

    #[test]
    #[should_panic]
    fn test_encode_scalar_rejects_strings() {
        let mut buf = [0u8; 4];
        Key::from("x").encode_scalar(&mut buf);
    }
}
