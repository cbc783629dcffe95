//! Replica fan-out sender.
//!
//! Sends one logical request to the replicas of a range and returns the
//! first successful reply. Candidates are tried in random order; a new
//! candidate is started whenever the previous ones fail or have not
//! answered within the send-next timeout, so one slow replica never stalls
//! the dispatch. The whole dispatch is bounded by the RPC timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use kestrel_core::api::{RoutedRequest, RoutedResponse};
use kestrel_core::{Error, Limits, Replica, Result};
use rand::seq::SliceRandom;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::resolver::NodeAddrResolver;
use crate::transport::RpcTransport;

/// Timeouts governing one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Overall deadline for the dispatch.
    pub rpc_timeout: Duration,
    /// Delay before an additional candidate is started while earlier ones
    /// are still outstanding.
    pub send_next_timeout: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        let limits = Limits::new();
        Self {
            rpc_timeout: Duration::from_micros(limits.rpc_timeout_us),
            send_next_timeout: Duration::from_micros(limits.send_next_timeout_us),
        }
    }
}

/// Dispatches requests to replica sets.
pub struct ReplicaSender {
    addrs: NodeAddrResolver,
    transport: Arc<dyn RpcTransport>,
    options: SendOptions,
}

impl std::fmt::Debug for ReplicaSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSender")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ReplicaSender {
    /// Creates a sender.
    #[must_use]
    pub fn new(
        addrs: NodeAddrResolver,
        transport: Arc<dyn RpcTransport>,
        options: SendOptions,
    ) -> Self {
        Self {
            addrs,
            transport,
            options,
        }
    }

    /// Returns the sender's timeouts.
    #[must_use]
    pub const fn options(&self) -> SendOptions {
        self.options
    }

    /// Sends `request` to `replicas` and returns the first successful reply.
    ///
    /// Each copy of the request is stamped with the replica it is addressed
    /// to. Replicas whose address is not gossiped are skipped.
    ///
    /// # Errors
    ///
    /// - `Error::EmptyReplicaSet` if `replicas` is empty (terminal).
    /// - `Error::NoNodeAddrsAvailable` if no replica address resolves.
    /// - `Error::Timeout` if no reply arrives within the RPC timeout.
    /// - The last transport error if every candidate failed.
    pub async fn send<R: RoutedRequest>(
        &self,
        replicas: &[Replica],
        request: R,
    ) -> Result<R::Response> {
        let method = R::METHOD;
        if replicas.is_empty() {
            return Err(Error::EmptyReplicaSet { method });
        }

        let mut targets: Vec<(Replica, SocketAddr)> = replicas
            .iter()
            .filter_map(|replica| match self.addrs.resolve(replica.node_id) {
                Ok(addr) => Some((*replica, addr)),
                Err(err) => {
                    debug!(%method, node_id = %replica.node_id, error = %err, "skipping replica");
                    None
                }
            })
            .collect();
        if targets.is_empty() {
            return Err(Error::NoNodeAddrsAvailable { method });
        }
        targets.shuffle(&mut rand::thread_rng());

        let start = Instant::now();
        let deadline = start + self.options.rpc_timeout;
        let mut candidates = targets.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut last_error: Option<Error> = None;

        let launch = |(replica, addr): (Replica, SocketAddr)| {
            let transport = Arc::clone(&self.transport);
            let copy = request.with_replica(replica).into_request();
            trace!(%method, %addr, node_id = %replica.node_id, "sending to replica");
            async move { (addr, transport.call(addr, copy).await) }
        };

        if let Some(target) = candidates.next() {
            in_flight.push(launch(target));
        }
        let mut next_send = Instant::now() + self.options.send_next_timeout;

        loop {
            if in_flight.is_empty() {
                match candidates.next() {
                    Some(target) => {
                        in_flight.push(launch(target));
                        next_send = Instant::now() + self.options.send_next_timeout;
                    }
                    None => {
                        return Err(last_error.unwrap_or(Error::NoNodeAddrsAvailable { method }));
                    }
                }
            }

            tokio::select! {
                Some((addr, result)) = in_flight.next() => match result {
                    Ok(response) => match R::Response::from_response(response) {
                        Ok(response) => return Ok(response),
                        Err(other) => {
                            debug!(%method, %addr, got = %other.method(), "mismatched reply");
                            last_error = Some(Error::UnexpectedResponse { method });
                        }
                    },
                    Err(err) => {
                        debug!(%method, %addr, error = %err, "replica send failed");
                        last_error = Some(err.into_error(method, addr));
                    }
                },
                () = sleep_until(next_send), if candidates.len() > 0 => {
                    if let Some(target) = candidates.next() {
                        trace!(%method, "send-next timeout elapsed, trying another replica");
                        in_flight.push(launch(target));
                    }
                    next_send = Instant::now() + self.options.send_next_timeout;
                }
                () = sleep_until(deadline) => {
                    let waited_us =
                        u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
                    return Err(Error::Timeout { method, waited_us });
                }
            }
        }
    }
}
