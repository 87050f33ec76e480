use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::Error;

/// number of raw bytes in an object id
pub const OBJECT_ID_LEN: usize = 20;

/// content hash identifying an immutable revision object
///
/// the id of an object is a pure function of its canonical serialized
/// bytes, so two objects with identical logical content always share an id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// sentinel for "absent" (all zero bytes)
    pub const NULL: ObjectId = ObjectId([0u8; OBJECT_ID_LEN]);

    /// create from raw bytes
    pub fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// hash canonical serialized bytes into an id
    pub fn hash_of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut raw = [0u8; OBJECT_ID_LEN];
        raw.copy_from_slice(&digest[..OBJECT_ID_LEN]);
        Self(raw)
    }

    /// parse from hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidObjectId(s.to_string()))?;
        if bytes.len() != OBJECT_ID_LEN {
            return Err(Error::InvalidObjectId(s.to_string()));
        }
        let mut raw = [0u8; OBJECT_ID_LEN];
        raw.copy_from_slice(&bytes);
        Ok(Self(raw))
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// is this the "absent" sentinel
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// split into path components for the object store
    /// returns (first 2 hex chars, remaining 38 hex chars)
    pub fn to_path_components(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex_roundtrip() {
        let original = ObjectId::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        let hex = original.to_hex();
        let parsed = ObjectId::from_hex(&hex).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_id_invalid_hex() {
        assert!(ObjectId::from_hex("not valid hex").is_err());
        assert!(ObjectId::from_hex("abcd").is_err()); // too short
        assert!(ObjectId::from_hex("abcdef0123456789abcdef0123456789abcdef0123").is_err()); // too long
    }

    #[test]
    fn test_null_sentinel() {
        assert!(ObjectId::NULL.is_null());
        assert_eq!(ObjectId::NULL.to_hex(), "0".repeat(40));

        let other = ObjectId::hash_of(b"anything");
        assert!(!other.is_null());
    }

    #[test]
    fn test_hash_of_determinism() {
        let h1 = ObjectId::hash_of(b"hello");
        let h2 = ObjectId::hash_of(b"hello");
        assert_eq!(h1, h2);

        let h3 = ObjectId::hash_of(b"world");
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_id_path_components() {
        let id = ObjectId::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        let (dir, file) = id.to_path_components();
        assert_eq!(dir, "ab");
        assert_eq!(file, "cdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_id_ordering() {
        let h1 = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let h2 = ObjectId::from_hex("0000000000000000000000000000000000000002").unwrap();
        assert!(h1 < h2);
    }

    #[test]
    fn test_id_serde_json() {
        let id = ObjectId::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.contains("abcdef"));
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
