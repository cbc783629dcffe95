//! Asynchronous request router.
//!
//! The router turns a request into a background task that resolves the
//! key's range and dispatches to its replicas, retrying transient failures
//! with exponential backoff. The caller gets a [`Completion`] immediately;
//! it resolves to exactly one response, carrying either the result or the
//! terminal error.
//!
//! Each routed operation moves through
//!
//! ```text
//! PENDING -> RESOLVING -> DISPATCHING -> SUCCEEDED | FAILED
//!                ^             |
//!                +- RETRYING <-+
//! ```
//!
//! A started operation is not cancelled when its completion is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use kestrel_core::api::{Method, RoutedRequest, RoutedResponse};
use kestrel_core::{Error, Key, Result, Retryable};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::config::RoutingConfig;
use crate::gossip::Gossip;
use crate::range_cache::RangeCache;
use crate::resolver::{into_result, NodeAddrResolver, RangeResolver};
use crate::retry::{retry_with_backoff, RetryOptions};
use crate::sender::ReplicaSender;
use crate::transport::RpcTransport;

/// Receive end of a routed operation.
///
/// Resolves to the operation's response. If the routing task ends without
/// posting one, the completion resolves to a response carrying
/// `Error::Abandoned` instead of hanging.
#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited"]
pub struct Completion<T> {
    method: Method,
    rx: oneshot::Receiver<T>,
}

impl<T: RoutedResponse> Completion<T> {
    fn channel(method: Method) -> (oneshot::Sender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { method, rx })
    }

    /// Returns a completion that already holds `response`.
    pub fn ready(method: Method, response: T) -> Self {
        let (tx, completion) = Self::channel(method);
        // The receiver is alive, so the send cannot fail.
        let _ = tx.send(response);
        completion
    }

    /// Returns a completion that already holds a response carrying `err`.
    pub fn failed(method: Method, err: Error) -> Self {
        Self::ready(method, T::from_error(err))
    }

    /// Returns the method of the routed operation.
    pub const fn method(&self) -> Method {
        self.method
    }
}

impl<T: RoutedResponse> Future for Completion<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let method = self.method;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| T::from_error(Error::Abandoned { method })))
    }
}

/// Counters describing router activity.
#[derive(Debug, Default)]
pub struct RouterStats {
    attempts: AtomicU64,
    retries: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterStatsSnapshot {
    /// Resolve-and-dispatch attempts started.
    pub attempts: u64,
    /// Attempts that followed a retryable failure.
    pub retries: u64,
    /// Operations completed with a result.
    pub succeeded: u64,
    /// Operations completed with a terminal error.
    pub failed: u64,
}

impl RouterStats {
    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Routes requests to the replicas of the range owning their key.
pub struct Router {
    resolver: RangeResolver,
    sender: Arc<ReplicaSender>,
    retry: RetryOptions,
    stats: RouterStats,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("retry", &self.retry)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Creates a router reading cluster state from `gossip` and sending
    /// through `transport`.
    #[must_use]
    pub fn new(
        gossip: Arc<dyn Gossip>,
        transport: Arc<dyn RpcTransport>,
        config: &RoutingConfig,
    ) -> Self {
        let sender = Arc::new(ReplicaSender::new(
            NodeAddrResolver::new(Arc::clone(&gossip)),
            transport,
            config.send_options(),
        ));
        let cache = Arc::new(RangeCache::new(config.range_cache));
        Self {
            resolver: RangeResolver::new(gossip, Arc::clone(&sender), cache),
            sender,
            retry: config.retry.clone(),
            stats: RouterStats::default(),
        }
    }

    /// Returns the range resolver.
    #[must_use]
    pub const fn resolver(&self) -> &RangeResolver {
        &self.resolver
    }

    /// Returns the activity counters.
    #[must_use]
    pub const fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Routes `request` to the range containing `key`.
    ///
    /// Returns immediately; the work runs on a spawned tokio task. Must be
    /// called from within a tokio runtime.
    pub fn route<R: RoutedRequest>(
        self: &Arc<Self>,
        key: Key,
        request: R,
    ) -> Completion<R::Response> {
        let method = R::METHOD;
        let (tx, completion) = Completion::channel(method);
        let router = Arc::clone(self);
        trace!(%method, %key, state = "pending", "routing request");

        tokio::spawn(async move {
            let result = retry_with_backoff(method.as_str(), &router.retry, |attempt| {
                router.attempt(&key, &request, attempt)
            })
            .await;

            let response = match result {
                Ok(response) => {
                    router.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(%method, %key, state = "succeeded", "request routed");
                    response
                }
                Err(err) => {
                    router.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(%method, %key, state = "failed", error = %err, "request failed");
                    R::Response::from_error(err)
                }
            };
            if tx.send(response).is_err() {
                debug!(%method, %key, "completion dropped before response");
            }
        });

        completion
    }

    /// One resolve-then-dispatch cycle.
    async fn attempt<R: RoutedRequest>(
        &self,
        key: &Key,
        request: &R,
        attempt: u32,
    ) -> Result<R::Response> {
        let method = R::METHOD;
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        if attempt > 1 {
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            debug!(%method, %key, attempt, state = "retrying", "retrying request");
        }

        trace!(%method, %key, attempt, state = "resolving", "resolving range");
        let locations = self.resolver.resolve_range(key).await?;

        trace!(
            %method,
            %key,
            attempt,
            state = "dispatching",
            replicas = locations.replicas.len(),
            "dispatching request"
        );
        let result = self
            .sender
            .send(&locations.replicas, request.clone())
            .await
            .and_then(into_result);
        if let Err(err) = &result {
            if err.can_retry() {
                // The cached locations may be stale.
                self.resolver.evict(key);
            }
        }
        result
    }
}
