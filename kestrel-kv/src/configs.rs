//! Cluster-wide configuration records.
//!
//! Each record is stored under its config prefix plus the key prefix it
//! applies to; the record at the bare prefix covers the whole key space.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Accounting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcctConfig {
    /// Cluster whose usage is accounted; empty for the local cluster.
    pub cluster_id: String,
}

/// One access grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// Users covered by the grant. The empty name matches every user.
    pub users: Vec<String>,
    /// Read access.
    pub read: bool,
    /// Write access.
    pub write: bool,
    /// Scheduling priority of the users' requests.
    pub priority: f32,
}

/// Permission configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PermConfig {
    /// Grants, in no particular order.
    pub perms: Vec<Permission>,
}

impl PermConfig {
    /// Read and write access for every user at priority 1.0.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            perms: vec![Permission {
                users: vec![String::new()],
                read: true,
                write: true,
                priority: 1.0,
            }],
        }
    }
}

/// Minimum range size of the default zone, in bytes.
pub const DEFAULT_RANGE_MIN_BYTES: i64 = 1 << 20;

/// Maximum range size of the default zone, in bytes.
pub const DEFAULT_RANGE_MAX_BYTES: i64 = 64 << 20;

/// Replication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Per datacenter, the required attributes of each replica's store.
    /// The empty datacenter name matches any datacenter.
    pub replicas: BTreeMap<String, Vec<String>>,
    /// Ranges smaller than this are merge candidates.
    pub range_min_bytes: i64,
    /// Ranges larger than this are split.
    pub range_max_bytes: i64,
}

impl ZoneConfig {
    /// Three replicas on `HDD` stores in any datacenter.
    #[must_use]
    pub fn three_hdd_replicas() -> Self {
        let mut replicas = BTreeMap::new();
        replicas.insert(String::new(), vec!["HDD".to_string(); 3]);
        Self {
            replicas,
            range_min_bytes: DEFAULT_RANGE_MIN_BYTES,
            range_max_bytes: DEFAULT_RANGE_MAX_BYTES,
        }
    }
}
