//! The distributed KV façade.

use std::sync::Arc;

use kestrel_core::api::{
    AccumulateTsRequest, AccumulateTsResponse, ContainsRequest, ContainsResponse,
    DeleteRangeRequest, DeleteRangeResponse, DeleteRequest, DeleteResponse, EndTransactionRequest,
    EndTransactionResponse, EnqueueMessageRequest, EnqueueMessageResponse, EnqueueUpdateRequest,
    EnqueueUpdateResponse, GetRequest, GetResponse, IncrementRequest, IncrementResponse,
    PutRequest, PutResponse, ReapQueueRequest, ReapQueueResponse, RoutedRequest, ScanRequest,
    ScanResponse,
};
use kestrel_core::{Error, Limits};
use kestrel_routing::{Completion, Gossip, Router, RoutingConfig, RpcTransport};
use tracing::{debug, warn};

/// Key-value operations over the whole cluster.
///
/// Every method returns at once; the returned [`Completion`] resolves to
/// exactly one response, whose error slot is set if the operation failed.
pub trait Db: Send + Sync {
    /// Checks whether a key exists.
    fn contains(&self, request: ContainsRequest) -> Completion<ContainsResponse>;

    /// Reads the value at a key.
    fn get(&self, request: GetRequest) -> Completion<GetResponse>;

    /// Writes a value at a key.
    fn put(&self, request: PutRequest) -> Completion<PutResponse>;

    /// Atomically adds to an integer value.
    fn increment(&self, request: IncrementRequest) -> Completion<IncrementResponse>;

    /// Deletes a key.
    fn delete(&self, request: DeleteRequest) -> Completion<DeleteResponse>;

    /// Deletes a span of keys. Routed by the span's start key only.
    fn delete_range(&self, request: DeleteRangeRequest) -> Completion<DeleteRangeResponse>;

    /// Reads a span of keys.
    fn scan(&self, request: ScanRequest) -> Completion<ScanResponse>;

    /// Commits or aborts a transaction. Routed by its first key only.
    fn end_transaction(&self, request: EndTransactionRequest)
        -> Completion<EndTransactionResponse>;

    /// Accumulates time-series counts.
    fn accumulate_ts(&self, request: AccumulateTsRequest) -> Completion<AccumulateTsResponse>;

    /// Reaps messages from an inbox.
    fn reap_queue(&self, request: ReapQueueRequest) -> Completion<ReapQueueResponse>;

    /// Enqueues an update for eventual execution.
    fn enqueue_update(&self, request: EnqueueUpdateRequest) -> Completion<EnqueueUpdateResponse>;

    /// Enqueues a message into an inbox.
    fn enqueue_message(&self, request: EnqueueMessageRequest)
        -> Completion<EnqueueMessageResponse>;
}

/// [`Db`] backed by the router.
///
/// Each call resolves the range owning the request's routing key and sends
/// the request to that range's replicas, retrying transient failures.
/// Requests without a routing key, or with one longer than
/// `Limits::max_key_bytes`, fail without being dispatched.
#[derive(Debug, Clone)]
pub struct DistDb {
    router: Arc<Router>,
    max_key_bytes: usize,
}

impl DistDb {
    /// Creates a database client.
    #[must_use]
    pub fn new(
        gossip: Arc<dyn Gossip>,
        transport: Arc<dyn RpcTransport>,
        config: &RoutingConfig,
    ) -> Self {
        Self::with_router(Arc::new(Router::new(gossip, transport, config)))
    }

    /// Creates a database client over an existing router.
    #[must_use]
    pub const fn with_router(router: Arc<Router>) -> Self {
        Self {
            router,
            max_key_bytes: Limits::new().max_key_bytes as usize,
        }
    }

    /// Returns the router.
    #[must_use]
    pub const fn router(&self) -> &Arc<Router> {
        &self.router
    }

    fn route<R: RoutedRequest>(&self, request: R) -> Completion<R::Response> {
        let method = R::METHOD;
        let Some(key) = request.routing_key().cloned() else {
            return Completion::failed(
                method,
                Error::InvalidArgument {
                    name: "key",
                    reason: "request names no routing key",
                },
            );
        };
        if key.len() > self.max_key_bytes {
            debug!(%method, key_len = key.len(), "rejecting oversized key");
            return Completion::failed(
                method,
                Error::InvalidArgument {
                    name: "key",
                    reason: "key exceeds max_key_bytes",
                },
            );
        }
        self.router.route(key, request)
    }

    fn not_implemented<R: RoutedRequest>() -> Completion<R::Response> {
        let method = R::METHOD;
        warn!(%method, "operation is not implemented");
        Completion::failed(method, Error::NotImplemented { method })
    }
}

impl Db for DistDb {
    fn contains(&self, request: ContainsRequest) -> Completion<ContainsResponse> {
        self.route(request)
    }

    fn get(&self, request: GetRequest) -> Completion<GetResponse> {
        self.route(request)
    }

    fn put(&self, request: PutRequest) -> Completion<PutResponse> {
        self.route(request)
    }

    fn increment(&self, request: IncrementRequest) -> Completion<IncrementResponse> {
        self.route(request)
    }

    fn delete(&self, request: DeleteRequest) -> Completion<DeleteResponse> {
        self.route(request)
    }

    fn delete_range(&self, request: DeleteRangeRequest) -> Completion<DeleteRangeResponse> {
        self.route(request)
    }

    fn scan(&self, _request: ScanRequest) -> Completion<ScanResponse> {
        Self::not_implemented::<ScanRequest>()
    }

    fn end_transaction(
        &self,
        request: EndTransactionRequest,
    ) -> Completion<EndTransactionResponse> {
        self.route(request)
    }

    fn accumulate_ts(&self, request: AccumulateTsRequest) -> Completion<AccumulateTsResponse> {
        self.route(request)
    }

    fn reap_queue(&self, request: ReapQueueRequest) -> Completion<ReapQueueResponse> {
        self.route(request)
    }

    fn enqueue_update(&self, _request: EnqueueUpdateRequest) -> Completion<EnqueueUpdateResponse> {
        Self::not_implemented::<EnqueueUpdateRequest>()
    }

    fn enqueue_message(
        &self,
        request: EnqueueMessageRequest,
    ) -> Completion<EnqueueMessageResponse> {
        self.route(request)
    }
}
