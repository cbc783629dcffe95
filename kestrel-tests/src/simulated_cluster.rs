//! Simulated storage cluster for routing integration tests.
//!
//! The cluster plays the part of every storage node behind one
//! [`RpcTransport`]. Nodes are addressed by socket address and publish
//! themselves through an [`InfoStore`]. All replicas share one key-value map
//! (replication is assumed perfect); what differs per node is which ranges
//! it hosts. A node refuses requests that are stamped for another node or
//! whose key lies outside its ranges, the latter with a retryable error, as
//! a real node would after a split or rebalance.
//!
//! Routing metadata lives in the same map as user data, bincode-encoded,
//! exactly as the client's bootstrap helpers write it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kestrel_core::api::{
    AccumulateTsResponse, ContainsResponse, DeleteRangeResponse, DeleteResponse,
    EndTransactionResponse, EnqueueMessageResponse, GetResponse, IncrementResponse,
    InternalRangeLookupResponse, Method, PutResponse, ReapQueueResponse, Request, Response,
    RoutedRequest, RoutedResponse,
};
use kestrel_core::{
    make_key, Error, Key, NodeId, RangeLocations, Replica, Result, Value, KEY_MAX,
    KEY_META1_PREFIX, KEY_META2_PREFIX, KEY_MIN,
};
use kestrel_kv::{now_nanos, DistDb};
use kestrel_routing::{InfoStore, RoutingConfig, RpcTransport, TransportError, TransportResult};
use tracing::trace;

/// Length of the level-1 and level-2 metadata prefixes.
const META_PREFIX_LEN: usize = 7;

/// A failure injected into the next calls of one method.
#[derive(Debug, Clone)]
pub enum Fault {
    /// The call fails in the transport.
    Transport(TransportError),
    /// The node answers with this error in the reply's error slot.
    Remote(Error),
}

#[derive(Debug, Clone)]
struct SimNode {
    node_id: NodeId,
    down: bool,
    latency: Duration,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<SocketAddr, SimNode>,
    hosted: Vec<RangeLocations>,
    data: BTreeMap<Key, Value>,
    queues: HashMap<Key, VecDeque<Value>>,
    faults: HashMap<Method, VecDeque<Fault>>,
    method_calls: HashMap<Method, u64>,
    node_calls: HashMap<NodeId, u64>,
}

/// An in-process cluster of storage nodes.
#[derive(Debug, Default)]
pub struct SimCluster {
    gossip: Arc<InfoStore>,
    state: Mutex<State>,
}

/// Returns the address the cluster assigns to `node_id`.
#[must_use]
pub fn node_addr(node_id: NodeId) -> SocketAddr {
    let last = u8::try_from(node_id.get() % 250).unwrap_or(0);
    SocketAddr::from((Ipv4Addr::new(10, 0, 0, last), 7000))
}

impl SimCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates the standard two-range cluster.
    ///
    /// - node 1 hosts `[KEY_MIN, "m")`, which also holds every metadata entry
    /// - node 2 hosts `["m", KEY_MAX)`
    ///
    /// Both nodes are gossiped, as is the first range.
    #[must_use]
    pub fn two_ranges() -> Arc<Self> {
        let cluster = Self::new();
        cluster.add_node(NodeId::new(1));
        cluster.add_node(NodeId::new(2));
        cluster.set_first_range(RangeLocations::new(
            KEY_MIN,
            Key::from("m"),
            vec![replica(1)],
        ));
        cluster.add_range(RangeLocations::new(Key::from("m"), KEY_MAX, vec![replica(2)]));
        cluster
    }

    /// Returns the cluster's gossip view.
    #[must_use]
    pub fn gossip(&self) -> Arc<InfoStore> {
        Arc::clone(&self.gossip)
    }

    /// Returns a client of this cluster.
    #[must_use]
    pub fn db(self: &Arc<Self>, config: &RoutingConfig) -> DistDb {
        DistDb::new(self.gossip(), Arc::clone(self) as Arc<dyn RpcTransport>, config)
    }

    /// Adds a node and gossips its address.
    pub fn add_node(&self, node_id: NodeId) -> SocketAddr {
        let addr = self.add_hidden_node(node_id);
        self.publish_node(node_id);
        addr
    }

    /// Adds a node without gossiping its address.
    pub fn add_hidden_node(&self, node_id: NodeId) -> SocketAddr {
        let addr = node_addr(node_id);
        self.lock().nodes.insert(
            addr,
            SimNode {
                node_id,
                down: false,
                latency: Duration::ZERO,
            },
        );
        addr
    }

    /// Gossips the address of `node_id`.
    pub fn publish_node(&self, node_id: NodeId) {
        self.gossip.add_node_addr(node_id, node_addr(node_id));
    }

    /// Makes the first range host the level-1 entries, gossips it, and
    /// writes the level-1 entry pointing back at it.
    pub fn set_first_range(&self, locations: RangeLocations) {
        self.put_meta(make_key(&KEY_META1_PREFIX, &KEY_MAX), &locations);
        self.add_range(locations.clone());
        self.gossip.set_first_range(locations);
    }

    /// Hosts a range on its replicas and writes its level-2 entry.
    pub fn add_range(&self, locations: RangeLocations) {
        self.put_meta(make_key(&KEY_META2_PREFIX, &locations.end_bound()), &locations);
        self.lock().hosted.push(locations);
    }

    /// Replaces which ranges the nodes host, leaving metadata untouched.
    pub fn set_hosted_ranges(&self, ranges: Vec<RangeLocations>) {
        self.lock().hosted = ranges;
    }

    /// Queues `fault` for the next `times` calls of `method`.
    pub fn inject(&self, method: Method, fault: Fault, times: usize) {
        self.lock()
            .faults
            .entry(method)
            .or_default()
            .extend(std::iter::repeat(fault).take(times));
    }

    /// Marks a node as unreachable or reachable.
    pub fn set_down(&self, node_id: NodeId, down: bool) {
        self.with_node(node_id, |node| node.down = down);
    }

    /// Delays every reply from a node.
    pub fn set_latency(&self, node_id: NodeId, latency: Duration) {
        self.with_node(node_id, |node| node.latency = latency);
    }

    /// Returns how many calls of `method` reached the cluster.
    #[must_use]
    pub fn calls(&self, method: Method) -> u64 {
        self.lock().method_calls.get(&method).copied().unwrap_or(0)
    }

    /// Returns how many calls reached `node_id`.
    #[must_use]
    pub fn node_calls(&self, node_id: NodeId) -> u64 {
        self.lock().node_calls.get(&node_id).copied().unwrap_or(0)
    }

    /// Resets all call counters.
    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.method_calls.clear();
        state.node_calls.clear();
    }

    /// Returns the stored value at `key`.
    #[must_use]
    pub fn value(&self, key: &Key) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn with_node(&self, node_id: NodeId, f: impl FnOnce(&mut SimNode)) {
        if let Some(node) = self
            .lock()
            .nodes
            .values_mut()
            .find(|node| node.node_id == node_id)
        {
            f(node);
        }
    }

    fn put_meta(&self, key: Key, locations: &RangeLocations) {
        let bytes = bincode::serialize(locations).unwrap_or_default();
        self.lock().data.insert(key, Value::new(bytes, now_nanos()));
    }

    /// Runs `op` on the shared state as `node_id`, after checking that the
    /// node hosts the request's key.
    fn serve<R: RoutedRequest>(
        &self,
        node_id: NodeId,
        request: &R,
        injected: Option<Error>,
        op: impl FnOnce(&mut State) -> Result<R::Response>,
    ) -> Response {
        let mut state = self.lock();
        let result = match (injected, request.routing_key()) {
            (Some(err), _) => Err(err),
            (None, Some(key)) if !hosts(&state.hosted, node_id, key) => Err(Error::Remote {
                message: format!("range for key {key} not found on {node_id}"),
                retryable: true,
            }),
            (None, _) => op(&mut state),
        };
        match result {
            Ok(response) => response.into_response(),
            Err(err) => R::Response::from_error(err).into_response(),
        }
    }

    fn execute(&self, node_id: NodeId, request: Request, injected: Option<Error>) -> Response {
        match request {
            Request::InternalRangeLookup(r) => self.serve(node_id, &r, injected, |state| {
                range_lookup(&state.data, &r.key).map(|locations| InternalRangeLookupResponse {
                    locations,
                    ..InternalRangeLookupResponse::default()
                })
            }),
            Request::Contains(r) => self.serve(node_id, &r, injected, |state| {
                Ok(ContainsResponse {
                    exists: state.data.contains_key(&r.key),
                    ..ContainsResponse::default()
                })
            }),
            Request::Get(r) => self.serve(node_id, &r, injected, |state| {
                Ok(GetResponse {
                    value: state.data.get(&r.key).cloned(),
                    ..GetResponse::default()
                })
            }),
            Request::Put(r) => self.serve(node_id, &r, injected, |state| {
                state.data.insert(r.key.clone(), r.value.clone());
                Ok(PutResponse::default())
            }),
            Request::Increment(r) => self.serve(node_id, &r, injected, |state| {
                let current = match state.data.get(&r.key) {
                    Some(value) => decode_counter(value)?,
                    None => 0,
                };
                let new_value = current.wrapping_add(r.increment);
                let bytes = bincode::serialize(&new_value).map_err(|e| Error::Codec {
                    reason: e.to_string(),
                })?;
                state
                    .data
                    .insert(r.key.clone(), Value::new(bytes, now_nanos()));
                Ok(IncrementResponse {
                    new_value,
                    ..IncrementResponse::default()
                })
            }),
            Request::Delete(r) => self.serve(node_id, &r, injected, |state| {
                state.data.remove(&r.key);
                Ok(DeleteResponse::default())
            }),
            Request::DeleteRange(r) => self.serve(node_id, &r, injected, |state| {
                let limit = if r.max_entries_to_delete == 0 {
                    usize::MAX
                } else {
                    usize::try_from(r.max_entries_to_delete).unwrap_or(usize::MAX)
                };
                let doomed: Vec<Key> = state
                    .data
                    .range((Included(r.start_key.clone()), Excluded(r.end_key.clone())))
                    .map(|(key, _)| key.clone())
                    .take(limit)
                    .collect();
                for key in &doomed {
                    state.data.remove(key);
                }
                Ok(DeleteRangeResponse {
                    num_deleted: doomed.len() as u64,
                    ..DeleteRangeResponse::default()
                })
            }),
            Request::EndTransaction(r) => self.serve(node_id, &r, injected, |_| {
                Ok(EndTransactionResponse {
                    commit_timestamp: if r.commit { now_nanos() } else { 0 },
                    ..EndTransactionResponse::default()
                })
            }),
            Request::AccumulateTs(r) => self.serve(node_id, &r, injected, |_| {
                Ok(AccumulateTsResponse::default())
            }),
            Request::EnqueueMessage(r) => self.serve(node_id, &r, injected, |state| {
                state
                    .queues
                    .entry(r.inbox.clone())
                    .or_default()
                    .push_back(r.message.clone());
                Ok(EnqueueMessageResponse::default())
            }),
            Request::ReapQueue(r) => self.serve(node_id, &r, injected, |state| {
                let queue = state.queues.entry(r.inbox.clone()).or_default();
                let take = usize::try_from(r.max_results)
                    .unwrap_or(usize::MAX)
                    .min(queue.len());
                Ok(ReapQueueResponse {
                    messages: queue.drain(..take).collect(),
                    ..ReapQueueResponse::default()
                })
            }),
            Request::Scan(r) => self.serve(node_id, &r, injected, |_| {
                Err(Error::NotImplemented {
                    method: Method::Scan,
                })
            }),
            Request::EnqueueUpdate(r) => self.serve(node_id, &r, injected, |_| {
                Err(Error::NotImplemented {
                    method: Method::EnqueueUpdate,
                })
            }),
        }
    }
}

#[async_trait]
impl RpcTransport for SimCluster {
    async fn call(&self, addr: SocketAddr, request: Request) -> TransportResult<Response> {
        let method = request.method();
        let (node, fault) = {
            let mut state = self.lock();
            let Some(node) = state.nodes.get(&addr).cloned() else {
                return Err(TransportError::Unreachable {
                    addr,
                    reason: "no such node".to_string(),
                });
            };
            *state.method_calls.entry(method).or_default() += 1;
            *state.node_calls.entry(node.node_id).or_default() += 1;
            let fault = state
                .faults
                .get_mut(&method)
                .and_then(VecDeque::pop_front);
            (node, fault)
        };
        trace!(%method, %addr, node_id = %node.node_id, "simulated call");

        if !node.latency.is_zero() {
            tokio::time::sleep(node.latency).await;
        }
        if node.down {
            return Err(TransportError::Unreachable {
                addr,
                reason: "node is down".to_string(),
            });
        }

        let injected = match fault {
            Some(Fault::Transport(err)) => return Err(err),
            Some(Fault::Remote(err)) => Some(err),
            None => None,
        };

        let addressed = request.header().replica;
        if addressed.map(|replica| replica.node_id) != Some(node.node_id) {
            let err = Error::Remote {
                message: format!("request for {addressed:?} delivered to {}", node.node_id),
                retryable: false,
            };
            return Ok(self.execute(node.node_id, request, Some(err)));
        }

        Ok(self.execute(node.node_id, request, injected))
    }
}

/// Returns a replica on `node`.
#[must_use]
pub const fn replica(node: u64) -> Replica {
    Replica::new(NodeId::new(node))
}

fn hosts(ranges: &[RangeLocations], node_id: NodeId, key: &Key) -> bool {
    ranges.iter().any(|range| {
        range.contains(key) && range.replicas.iter().any(|r| r.node_id == node_id)
    })
}

/// Serves a metadata lookup: the first entry after `key` within the same
/// metadata level.
fn range_lookup(data: &BTreeMap<Key, Value>, key: &Key) -> Result<RangeLocations> {
    let level = Key::new(key.as_bytes()[..META_PREFIX_LEN.min(key.len())].to_vec());
    let (_, value) = data
        .range((Excluded(key.clone()), Unbounded))
        .next()
        .filter(|(meta_key, _)| meta_key.has_prefix(&level))
        .ok_or_else(|| Error::Remote {
            message: format!("no range metadata after {key}"),
            retryable: false,
        })?;
    bincode::deserialize(&value.bytes).map_err(|e| Error::Codec {
        reason: e.to_string(),
    })
}

fn decode_counter(value: &Value) -> Result<i64> {
    bincode::deserialize(&value.bytes).map_err(|e| Error::Codec {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use kestrel_core::api::{GetRequest, InternalRangeLookupRequest};

    use super::*;

    #[tokio::test]
    async fn test_lookup_finds_next_entry_in_level() {
        let cluster = SimCluster::two_ranges();
        let request = InternalRangeLookupRequest::new(make_key(&KEY_META2_PREFIX, &Key::from("q")))
            .with_replica(replica(1));

        let response = cluster
            .call(node_addr(NodeId::new(1)), request.into_request())
            .await
            .unwrap();

        let Response::InternalRangeLookup(lookup) = response else {
            panic!("unexpected response {response:?}");
        };
        assert!(lookup.header.error.is_none());
        assert_eq!(lookup.locations.replicas, vec![replica(2)]);
    }

    #[tokio::test]
    async fn test_rejects_misaddressed_and_unhosted_requests() {
        let cluster = SimCluster::two_ranges();
        let addr = node_addr(NodeId::new(1));

        let misaddressed = GetRequest::new("a").with_replica(replica(2));
        let response = cluster.call(addr, misaddressed.into_request()).await.unwrap();
        assert!(matches!(
            response.error(),
            Some(Error::Remote { retryable: false, .. })
        ));

        let unhosted = GetRequest::new("q").with_replica(replica(1));
        let response = cluster.call(addr, unhosted.into_request()).await.unwrap();
        assert!(matches!(
            response.error(),
            Some(Error::Remote { retryable: true, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_address_is_unreachable() {
        let cluster = SimCluster::two_ranges();
        let err = cluster
            .call(node_addr(NodeId::new(9)), GetRequest::new("a").into_request())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }
}
