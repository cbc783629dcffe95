//! Range ownership descriptors.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::key::{Key, KEY_MAX};
use crate::types::{NodeId, StoreId};

/// One copy of a range, hosted on a specific storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replica {
    /// Node hosting the replica.
    pub node_id: NodeId,
    /// Store within the node, when the node has several.
    pub store_id: Option<StoreId>,
}

impl Replica {
    /// Creates a replica on the given node with no specific store.
    #[must_use]
    pub const fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            store_id: None,
        }
    }

    /// Creates a replica pinned to a store.
    #[must_use]
    pub const fn with_store(node_id: NodeId, store_id: StoreId) -> Self {
        Self {
            node_id,
            store_id: Some(store_id),
        }
    }
}

/// The replicas owning a contiguous key range `[start_key, end_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeLocations {
    /// First key of the range (inclusive).
    pub start_key: Key,
    /// End of the range (exclusive). `None` means the range is unbounded
    /// above.
    pub end_key: Option<Key>,
    /// Replicas holding the range. Order carries no meaning.
    pub replicas: Vec<Replica>,
}

impl RangeLocations {
    /// Creates locations for `[start_key, end_key)`.
    #[must_use]
    pub fn new(start_key: Key, end_key: Key, replicas: Vec<Replica>) -> Self {
        Self {
            start_key,
            end_key: Some(end_key),
            replicas,
        }
    }

    /// Returns true if `key` falls inside this range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        *key >= self.start_key && self.end_key.as_ref().map_or(true, |end| key < end)
    }

    /// Returns the end bound, treating an open range as ending at `KEY_MAX`.
    #[must_use]
    pub fn end_bound(&self) -> Key {
        self.end_key.clone().unwrap_or(KEY_MAX)
    }
}

/// Boundary of a range, as used when rewriting routing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeMetadata {
    /// First key of the range (inclusive).
    pub start_key: Key,
    /// End of the range (exclusive).
    pub end_key: Key,
}

/// A stored value with its write timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Value {
    /// Raw value bytes.
    pub bytes: Bytes,
    /// Wall time of the write in unix nanoseconds.
    pub timestamp: i64,
}

impl Value {
    /// Creates a value with the given timestamp.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>, timestamp: i64) -> Self {
        Self {
            bytes: bytes.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_MIN;

    #[test]
    fn test_contains_bounds() {
        let range = RangeLocations::new(Key::from("b"), Key::from("d"), vec![]);

        assert!(!range.contains(&Key::from("a")));
        assert!(range.contains(&Key::from("b")));
        assert!(range.contains(&Key::from("c")));
        assert!(!range.contains(&Key::from("d")));
    }

    #[test]
    fn test_open_range() {
        let range = RangeLocations {
            start_key: KEY_MIN,
            end_key: None,
            replicas: vec![Replica::new(NodeId::new(1))],
        };

        assert!(range.contains(&KEY_MIN));
        assert!(range.contains(&Key::from("zzz")));
        assert_eq!(range.end_bound(), KEY_MAX);
    }
}
