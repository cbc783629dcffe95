//! Kestrel Tests - Simulated-cluster integration tests for Kestrel.
//!
//! Unit tests live inline in each crate. This crate exercises the full
//! client stack (façade, router, resolver, cache, sender) against an
//! in-process cluster with fault injection.
//!
//! ## Test Organization
//!
//! - `routing_tests`: Resolution, caching, fan-out and retry behavior
//! - `kv_tests`: Façade operations, typed values and metadata bootstrap
//!
//! **Support Modules**:
//! - `simulated_cluster`: `SimCluster`, an `RpcTransport` playing every node
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod simulated_cluster;


use tracing_subscriber::EnvFilter;

/// Installs a test-friendly log subscriber, once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
