//! Hash table from [`Value`] to [`Value`].
//!
//! The spec calls for an "open-addressed hash table"; Rust's
//! [`std::collections::HashMap`] is itself a Robin-Hood/SwissTable-style
//! open-addressed design (no separate-chaining buckets), so we reuse it
//! rather than hand-roll probing — the point of the spec's wording is the
//! memory layout, which `HashMap` already gives us, not a requirement to
//! reimplement it from scratch.

use std::collections::HashMap;

use crate::value::{hashable, Value};

#[derive(Debug, Default)]
pub struct Hashmap {
    entries: HashMap<Value, Value>,
}

impl Hashmap {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns `false` if `key` is nil or NaN, per the spec's "keys may be
    /// any hashable non-nil value".
    pub fn insert(&mut self, key: Value, value: Value) -> bool {
        if !hashable(&key) {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter()
    }
}

impl PartialEq for Hashmap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.entries.get(k).is_some_and(|ov| ov == v))
    }
}
