//! Immutable, length- and hash-cached byte string.

use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// An immutable string with its length and hash cached at construction,
/// matching the spec's "class hash function... immutable objects should
/// cache" invariant. `Rc<str>` gives us the immutability and cheap cloning
/// for free; the cache avoids re-hashing on every `EQ`/hashmap lookup.
#[derive(Debug, Clone)]
pub struct SpnString {
    bytes: Rc<str>,
    hash: u64,
}

impl SpnString {
    pub fn new(bytes: Rc<str>) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        bytes.hash(&mut hasher);
        let hash = hasher.finish();
        Self { bytes, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn cached_hash(&self) -> u64 {
        self.hash
    }

    pub fn rc(&self) -> Rc<str> {
        self.bytes.clone()
    }
}
