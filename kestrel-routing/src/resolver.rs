//! Node address and range metadata resolution.
//!
//! Locating the replicas for a key takes two metadata lookups. The first
//! range, whose locations are gossiped, holds the level-1 entries; a level-1
//! lookup yields the range holding the level-2 entry for the key, and the
//! level-2 lookup yields the range holding the key itself:
//!
//! ```text
//! gossip "first-range" -> lookup(meta1 + key) -> lookup(meta2 + key) -> replicas
//! ```
//!
//! Results are cached; the resolver never retries on its own.

use std::net::SocketAddr;
use std::sync::Arc;

use kestrel_core::api::{InternalRangeLookupRequest, RoutedResponse};
use kestrel_core::{
    make_key, Error, Key, NodeId, RangeLocations, Result, KEY_META1_PREFIX, KEY_META2_PREFIX,
};
use tracing::{debug, trace};

use crate::gossip::{node_id_gossip_key, Gossip, Info, KEY_FIRST_RANGE};
use crate::range_cache::RangeCache;
use crate::sender::ReplicaSender;

/// Returns the error carried in a reply's error slot, or the reply itself.
///
/// # Errors
///
/// Returns the reply's error if it has one.
pub fn into_result<T: RoutedResponse>(mut response: T) -> Result<T> {
    match response.header_mut().error.take() {
        Some(err) => Err(err),
        None => Ok(response),
    }
}

/// Maps node ids to network addresses through gossip.
#[derive(Clone)]
pub struct NodeAddrResolver {
    gossip: Arc<dyn Gossip>,
}

impl NodeAddrResolver {
    /// Creates a resolver reading from `gossip`.
    #[must_use]
    pub fn new(gossip: Arc<dyn Gossip>) -> Self {
        Self { gossip }
    }

    /// Returns the gossiped address of `node_id`.
    ///
    /// Always reads live gossip state.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeAddrNotFound` if no live address is gossiped.
    pub fn resolve(&self, node_id: NodeId) -> Result<SocketAddr> {
        match self.gossip.get_info(&node_id_gossip_key(node_id)) {
            Ok(Info::NodeAddr(addr)) => Ok(addr),
            Ok(other) => {
                debug!(%node_id, ?other, "node address key holds a different info");
                Err(Error::NodeAddrNotFound { node_id })
            }
            Err(_) => Err(Error::NodeAddrNotFound { node_id }),
        }
    }
}

/// Resolves keys to the locations of the range containing them.
pub struct RangeResolver {
    gossip: Arc<dyn Gossip>,
    sender: Arc<ReplicaSender>,
    cache: Arc<RangeCache>,
}

impl RangeResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        gossip: Arc<dyn Gossip>,
        sender: Arc<ReplicaSender>,
        cache: Arc<RangeCache>,
    ) -> Self {
        Self {
            gossip,
            sender,
            cache,
        }
    }

    /// Returns the range cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<RangeCache> {
        &self.cache
    }

    /// Returns the locations of the range containing `key`.
    ///
    /// Served from the cache when possible; otherwise performs one level-1
    /// and one level-2 lookup and caches the result.
    ///
    /// # Errors
    ///
    /// Returns `Error::FirstRangeMissing` if the first range has not been
    /// gossiped yet, and any error from either lookup unchanged.
    pub async fn resolve_range(&self, key: &Key) -> Result<RangeLocations> {
        if let Some(locations) = self.cache.get(key) {
            trace!(%key, "range cache hit");
            return Ok(locations);
        }

        let first = self.first_range()?;
        let meta1 = self.lookup(&first, make_key(&KEY_META1_PREFIX, key)).await?;
        let meta2 = self.lookup(&meta1, make_key(&KEY_META2_PREFIX, key)).await?;

        debug!(
            %key,
            start = %meta2.start_key,
            end = %meta2.end_bound(),
            replicas = meta2.replicas.len(),
            "resolved range"
        );
        self.cache.insert(meta2.clone());
        Ok(meta2)
    }

    /// Drops the cached range containing `key`, if any.
    pub fn evict(&self, key: &Key) {
        if self.cache.evict(key) {
            debug!(%key, "evicted range cache entry");
        }
    }

    fn first_range(&self) -> Result<RangeLocations> {
        match self.gossip.get_info(KEY_FIRST_RANGE) {
            Ok(Info::RangeLocations(locations)) => Ok(locations),
            Ok(_) => Err(Error::FirstRangeMissing {
                reason: "first-range key holds a different info".to_string(),
            }),
            Err(err) => Err(Error::FirstRangeMissing {
                reason: err.to_string(),
            }),
        }
    }

    async fn lookup(&self, range: &RangeLocations, meta_key: Key) -> Result<RangeLocations> {
        trace!(key = %meta_key, "range lookup");
        let request = InternalRangeLookupRequest::new(meta_key);
        let response = into_result(self.sender.send(&range.replicas, request).await?)?;
        Ok(response.locations)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::ops::Bound::{Excluded, Unbounded};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use kestrel_core::api::{InternalRangeLookupResponse, Request, Response};
    use kestrel_core::{Replica, Retryable, KEY_MAX, KEY_MIN};

    use super::*;
    use crate::gossip::InfoStore;
    use crate::range_cache::RangeCacheConfig;
    use crate::sender::SendOptions;
    use crate::transport::{RpcTransport, TransportError, TransportResult};

    /// Answers range lookups from a flat metadata table.
    struct MetaTransport {
        meta: BTreeMap<Key, RangeLocations>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl RpcTransport for MetaTransport {
        async fn call(&self, _addr: SocketAddr, request: Request) -> TransportResult<Response> {
            let Request::InternalRangeLookup(lookup) = request else {
                return Err(TransportError::Codec("unexpected request".to_string()));
            };
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let locations = self
                .meta
                .range((Excluded(lookup.key), Unbounded))
                .next()
                .map(|(_, locations)| locations.clone())
                .unwrap_or_default();
            Ok(InternalRangeLookupResponse {
                locations,
                ..InternalRangeLookupResponse::default()
            }
            .into_response())
        }
    }

    fn replica(node: u64) -> Replica {
        Replica::new(NodeId::new(node))
    }

    fn setup(with_first_range: bool) -> (Arc<MetaTransport>, RangeResolver) {
        let r1 = RangeLocations::new(KEY_MIN, Key::from("m"), vec![replica(1)]);
        let r2 = RangeLocations::new(Key::from("m"), KEY_MAX, vec![replica(2)]);

        let mut meta = BTreeMap::new();
        meta.insert(make_key(&KEY_META1_PREFIX, &KEY_MAX), r1.clone());
        meta.insert(make_key(&KEY_META2_PREFIX, &Key::from("m")), r1.clone());
        meta.insert(make_key(&KEY_META2_PREFIX, &KEY_MAX), r2);

        let gossip = Arc::new(InfoStore::new());
        gossip.add_node_addr(NodeId::new(1), "127.0.0.1:7001".parse().unwrap());
        gossip.add_node_addr(NodeId::new(2), "127.0.0.1:7002".parse().unwrap());
        if with_first_range {
            gossip.set_first_range(r1);
        }

        let transport = Arc::new(MetaTransport {
            meta,
            lookups: AtomicUsize::new(0),
        });
        let sender = Arc::new(ReplicaSender::new(
            NodeAddrResolver::new(gossip.clone()),
            transport.clone(),
            SendOptions {
                rpc_timeout: Duration::from_secs(1),
                send_next_timeout: Duration::from_millis(100),
            },
        ));
        let cache = Arc::new(RangeCache::new(RangeCacheConfig { max_entries: 16 }));
        (transport, RangeResolver::new(gossip, sender, cache))
    }

    #[test]
    fn test_node_addr_resolver() {
        let gossip = Arc::new(InfoStore::new());
        let addr: SocketAddr = "127.0.0.1:7001".parse().unwrap();
        gossip.add_node_addr(NodeId::new(1), addr);
        let resolver = NodeAddrResolver::new(gossip.clone());

        assert_eq!(resolver.resolve(NodeId::new(1)), Ok(addr));
        assert_eq!(
            resolver.resolve(NodeId::new(2)),
            Err(Error::NodeAddrNotFound {
                node_id: NodeId::new(2)
            })
        );

        // No caching: a removed address is gone immediately.
        gossip.remove_info("node:1");
        assert!(resolver.resolve(NodeId::new(1)).is_err());
    }

    #[tokio::test]
    async fn test_two_hop_resolution() {
        let (transport, resolver) = setup(true);

        let locations = resolver.resolve_range(&Key::from("q")).await.unwrap();

        assert_eq!(locations.replicas, vec![replica(2)]);
        assert!(locations.contains(&Key::from("q")));
        assert_eq!(transport.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_lookups() {
        let (transport, resolver) = setup(true);

        resolver.resolve_range(&Key::from("apple")).await.unwrap();
        let locations = resolver.resolve_range(&Key::from("banana")).await.unwrap();

        assert_eq!(locations.replicas, vec![replica(1)]);
        assert_eq!(transport.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_forces_lookup() {
        let (transport, resolver) = setup(true);

        resolver.resolve_range(&Key::from("q")).await.unwrap();
        resolver.evict(&Key::from("q"));
        resolver.resolve_range(&Key::from("q")).await.unwrap();

        assert_eq!(transport.lookups.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_first_range_missing_is_retryable() {
        let (transport, resolver) = setup(false);

        let err = resolver.resolve_range(&Key::from("q")).await.unwrap_err();

        assert!(matches!(err, Error::FirstRangeMissing { .. }));
        assert!(err.can_retry());
        assert_eq!(transport.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_into_result() {
        let ok = into_result(InternalRangeLookupResponse::default());
        assert!(ok.is_ok());

        let err = into_result(InternalRangeLookupResponse::from_error(Error::Remote {
            message: "range not found".to_string(),
            retryable: true,
        }));
        assert!(matches!(err, Err(Error::Remote { retryable: true, .. })));
    }
}
