//! Gossip collaborator interface.
//!
//! Gossip publishes eventually-consistent facts about the cluster. Routing
//! reads two kinds: the network address of each node and the locations of
//! the first range, which bootstraps metadata resolution. The routing layer
//! never writes gossip.
//!
//! [`InfoStore`] is the node-local view of gossiped infos. Dissemination
//! (peer selection, anti-entropy) fills it from outside this crate.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use kestrel_core::{NodeId, RangeLocations};
use thiserror::Error;
use tokio::time::Instant;

/// Gossip key under which the first range's locations are published.
pub const KEY_FIRST_RANGE: &str = "first-range";

/// Returns the gossip key under which `node_id` publishes its address.
#[must_use]
pub fn node_id_gossip_key(node_id: NodeId) -> String {
    format!("node:{}", node_id.get())
}

/// A gossiped fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Info {
    /// A node's RPC address.
    NodeAddr(SocketAddr),
    /// Locations of a range.
    RangeLocations(RangeLocations),
}

/// Gossip lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GossipError {
    /// Nothing has been gossiped under the key.
    #[error("no info gossiped for key {key}")]
    NotFound {
        /// The key looked up.
        key: String,
    },

    /// The info existed but its TTL has passed.
    #[error("info for key {key} expired")]
    Expired {
        /// The key looked up.
        key: String,
    },
}

/// Read access to gossiped infos.
///
/// Implementations must be thread-safe; lookups always reflect live state.
pub trait Gossip: Send + Sync + 'static {
    /// Returns the info stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if no live info exists under `key`.
    fn get_info(&self, key: &str) -> Result<Info, GossipError>;
}

/// A stored info and its expiry.
#[derive(Debug, Clone)]
struct InfoEntry {
    info: Info,
    expires_at: Option<Instant>,
}

impl InfoEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory, TTL-aware store of gossiped infos.
#[derive(Debug, Default)]
pub struct InfoStore {
    infos: RwLock<HashMap<String, InfoEntry>>,
}

impl InfoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `info` under `key`, replacing any previous value. With a TTL
    /// the info stops being visible once the TTL elapses.
    ///
    /// Expired infos are dropped on every write.
    pub fn add_info(&self, key: impl Into<String>, info: Info, ttl: Option<Duration>) {
        let now = Instant::now();
        let entry = InfoEntry {
            info,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut infos = self.infos.write().unwrap_or_else(PoisonError::into_inner);
        infos.retain(|_, existing| existing.is_live(now));
        infos.insert(key.into(), entry);
    }

    /// Removes the info under `key`. Returns true if one was present.
    pub fn remove_info(&self, key: &str) -> bool {
        self.infos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Publishes a node's address without expiry.
    pub fn add_node_addr(&self, node_id: NodeId, addr: SocketAddr) {
        self.add_info(node_id_gossip_key(node_id), Info::NodeAddr(addr), None);
    }

    /// Publishes the first range's locations without expiry.
    pub fn set_first_range(&self, locations: RangeLocations) {
        self.add_info(KEY_FIRST_RANGE, Info::RangeLocations(locations), None);
    }

    /// Returns the number of stored infos, including expired ones not yet
    /// pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Gossip for InfoStore {
    fn get_info(&self, key: &str) -> Result<Info, GossipError> {
        let infos = self.infos.read().unwrap_or_else(PoisonError::into_inner);
        let entry = infos.get(key).ok_or_else(|| GossipError::NotFound {
            key: key.to_string(),
        })?;
        if !entry.is_live(Instant::now()) {
            return Err(GossipError::Expired {
                key: key.to_string(),
            });
        }
        Ok(entry.info.clone())
    }
}
