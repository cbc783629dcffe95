//! Kestrel Core - Keys, ranges, errors and request types.
//!
//! This crate holds the data model shared by the Kestrel client: ordered
//! keys and the reserved metadata namespaces, range ownership descriptors,
//! the error taxonomy and the storage-node request/response API.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: Prevent mixing up `NodeId` with `StoreId`
//! - **Total error taxonomy**: Every error is retryable or terminal
//! - **Explicit limits**: Every cache and timeout has a bound
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
mod error;
mod key;
mod limits;
mod range;
mod types;

pub use error::{Error, Result, Retryable};
pub use key::{
    make_key, Key, KEY_CONFIG_ACCOUNTING_PREFIX, KEY_CONFIG_PERMISSION_PREFIX,
    KEY_CONFIG_ZONE_PREFIX, KEY_MAX, KEY_META1_PREFIX, KEY_META2_PREFIX, KEY_MIN,
};
pub use limits::Limits;
pub use range::{RangeLocations, RangeMetadata, Replica, Value};
pub use types::{NodeId, StoreId};
