//! Kestrel Routing - Range resolution and request routing.
//!
//! This crate locates the storage nodes serving a key and delivers requests
//! to them. Keys map to ranges through a two-level metadata index whose root
//! is published via gossip; resolved ranges are cached, requests fan out to
//! a range's replicas, and transient failures are retried with exponential
//! backoff.
//!
//! # Design
//!
//! - **Two-hop resolution**: Level-1 then level-2 metadata, never more
//! - **Cache first**: A cached range skips both lookups
//! - **First success wins**: Any one replica answering completes a dispatch
//! - **Exactly one reply**: Every routed request resolves to one response

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod gossip;
mod range_cache;
mod resolver;
mod retry;
mod router;
mod sender;
mod transport;

pub use config::{ConfigError, RoutingConfig};
pub use gossip::{node_id_gossip_key, Gossip, GossipError, Info, InfoStore, KEY_FIRST_RANGE};
pub use range_cache::{RangeCache, RangeCacheConfig};
pub use resolver::{into_result, NodeAddrResolver, RangeResolver};
pub use retry::{retry_with_backoff, Backoff, RetryOptions, RETRY_MULTIPLIER_DEFAULT};
pub use router::{Completion, Router, RouterStats, RouterStatsSnapshot};
pub use sender::{ReplicaSender, SendOptions};
pub use transport::{RpcTransport, TransportError, TransportResult};
