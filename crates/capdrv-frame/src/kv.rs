use std::collections::HashMap;

use bytes::Bytes;

/// Keyed-object header: key (16) + object size (4) = 20 bytes.
pub const KV_HEADER_SIZE: usize = 20;

/// Maximum key length in bytes (NUL-padded on the wire).
pub const KEY_SIZE: usize = 16;

/// A tagged, length-prefixed chunk inside a frame's payload.
///
/// Keys are ASCII, at most 16 bytes, and compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedObject {
    pub key: String,
    pub bytes: Bytes,
}

impl KeyedObject {
    pub fn new(key: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            bytes: bytes.into(),
        }
    }

    /// The total wire size of this object (header + content).
    pub fn wire_size(&self) -> usize {
        KV_HEADER_SIZE + self.bytes.len()
    }
}

/// Case-insensitive lookup table over a frame's keyed objects.
///
/// Keys are folded to lowercase; duplicate keys resolve last-write-wins.
#[derive(Debug, Default)]
pub struct KvMap {
    entries: HashMap<String, Bytes>,
}

impl KvMap {
    pub fn from_objects(objects: &[KeyedObject]) -> Self {
        let mut entries = HashMap::with_capacity(objects.len());
        for obj in objects {
            entries.insert(obj.key.to_ascii_lowercase(), obj.bytes.clone());
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(&key.to_ascii_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
