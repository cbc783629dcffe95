//! Strongly-typed identifiers for Kestrel entities.
//!
//! Node and store ids travel inside replica descriptors and gossip keys, so
//! mixing them up silently misroutes requests. Wrapping them keeps the
//! compiler on our side.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix `NodeId` with `StoreId`)
/// - Debug/Display formatting
/// - Transparent serde encoding (same bytes as a raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(NodeId, "node", "Unique identifier for a storage node in the cluster.");
define_id!(StoreId, "store", "Identifier for a store (disk) within a node.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        let node = NodeId::new(42);
        assert_eq!(format!("{node}"), "node-42");
        assert_eq!(format!("{node:?}"), "node(42)");

        let store = StoreId::new(7);
        assert_eq!(format!("{store}"), "store-7");
    }

    #[test]
    fn test_id_ordering() {
        let a = NodeId::new(1);
        let b = NodeId::new(2);

        assert!(a < b);
        assert_eq!(a, NodeId::from(1));
        assert_eq!(u64::from(b), 2);
    }
}
