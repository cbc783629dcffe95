//! Keys and the reserved key namespaces.
//!
//! Keys are opaque byte strings ordered lexicographically. The key space is
//! partitioned into contiguous ranges; the routing metadata describing those
//! ranges lives in the same key space under reserved prefixes that sort
//! before any user key.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The smallest possible key.
pub const KEY_MIN: Key = Key::from_static(b"");

/// The largest key. Every user range ends at or before it.
pub const KEY_MAX: Key = Key::from_static(b"\xff\xff");

/// Prefix of level-1 range metadata. Entries are keyed by the end key of a
/// level-2 metadata range.
pub const KEY_META1_PREFIX: Key = Key::from_static(b"\x00\x00meta1");

/// Prefix of level-2 range metadata. Entries are keyed by the end key of a
/// user data range.
pub const KEY_META2_PREFIX: Key = Key::from_static(b"\x00\x00meta2");

/// Prefix for accounting configuration.
pub const KEY_CONFIG_ACCOUNTING_PREFIX: Key = Key::from_static(b"\x00acct");

/// Prefix for permission configuration.
pub const KEY_CONFIG_PERMISSION_PREFIX: Key = Key::from_static(b"\x00perm");

/// Prefix for zone configuration.
pub const KEY_CONFIG_ZONE_PREFIX: Key = Key::from_static(b"\x00zone");

/// An opaque, ordered key.
///
/// Cloning is cheap: the bytes are reference counted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Bytes);

impl Key {
    /// Creates a key from anything convertible to bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Creates a key from a static byte string without copying.
    #[must_use]
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty key (`KEY_MIN`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if this key starts with `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the remainder of the key after `prefix`, if present.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Self) -> Option<Self> {
        if self.has_prefix(prefix) {
            Some(Self(self.0.slice(prefix.len()..)))
        } else {
            None
        }
    }

    /// Consumes the key and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Joins a prefix and a key into a single key.
#[must_use]
pub fn make_key(prefix: &Key, key: &Key) -> Key {
    let mut buf = Vec::with_capacity(prefix.len() + key.len());
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(key.as_bytes());
    Key::new(buf)
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(\"{self}\")")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            write!(f, "{}", std::ascii::escape_default(b))?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::from(s.as_bytes())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<Bytes> for Key {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}
