//! Kestrel KV - Distributed key-value client.
//!
//! [`DistDb`] exposes the cluster as one ordered key-value store: each
//! operation is routed to the range owning its key and answered through a
//! [`Completion`](kestrel_routing::Completion). On top of the raw operations
//! this crate provides typed value helpers and the bootstrap writes that
//! seed routing metadata and default configs on a fresh cluster.
//!
//! # Example
//!
//! ```ignore
//! let db = DistDb::new(gossip, transport, &RoutingConfig::default());
//! put_value(&db, "greeting", &"hello".to_string()).await?;
//! let (greeting, written_at) = get_value::<String, _>(&db, "greeting").await?.unwrap();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod bootstrap;
mod configs;
mod db;
#[cfg(test)]
mod test_db;
mod typed;

pub use bootstrap::{bootstrap_configs, bootstrap_range_locations, update_range_locations};
pub use configs::{
    AcctConfig, PermConfig, Permission, ZoneConfig, DEFAULT_RANGE_MAX_BYTES,
    DEFAULT_RANGE_MIN_BYTES,
};
pub use db::{Db, DistDb};
pub use typed::{get_value, now_nanos, put_value};
