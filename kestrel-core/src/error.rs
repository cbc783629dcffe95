//! Error types for Kestrel operations.
//!
//! Every failure is classified as retryable or terminal. The router retries
//! the former indefinitely and surfaces the latter to the caller through the
//! response's error slot, exactly once.

use std::fmt;

use crate::api::Method;
use crate::types::NodeId;

/// The result type for Kestrel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure as transient or terminal.
///
/// Whoever raises an error decides whether it may be retried; the router only
/// ever asks.
pub trait Retryable {
    /// Returns true if the same operation may succeed when attempted again.
    fn can_retry(&self) -> bool;
}

/// Errors that can occur while routing or executing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The first range locations have not been gossiped to this node yet.
    FirstRangeMissing {
        /// Why the gossip lookup failed.
        reason: String,
    },

    /// A node's address is not (yet) known via gossip.
    NodeAddrNotFound {
        /// The node whose address is missing.
        node_id: NodeId,
    },

    /// None of the replicas in a non-empty set has a gossiped address.
    NoNodeAddrsAvailable {
        /// The method being dispatched.
        method: Method,
    },

    /// The replica set handed to the sender was empty. Indicates corrupt
    /// metadata, never a transient condition.
    EmptyReplicaSet {
        /// The method being dispatched.
        method: Method,
    },

    /// No replica answered within the RPC timeout.
    Timeout {
        /// The method being dispatched.
        method: Method,
        /// How long we waited (in microseconds).
        waited_us: u64,
    },

    /// The transport failed to deliver a request or its reply.
    Transport {
        /// The method being dispatched.
        method: Method,
        /// Target address.
        addr: String,
        /// Failure description.
        reason: String,
        /// Whether the transport considers the failure transient.
        retryable: bool,
    },

    /// A storage node executed the request and reported an error.
    Remote {
        /// Error description from the node.
        message: String,
        /// Whether the node considers the failure transient.
        retryable: bool,
    },

    /// A reply did not match the request's method.
    UnexpectedResponse {
        /// The method that was sent.
        method: Method,
    },

    /// The operation is not supported by this client.
    NotImplemented {
        /// The unsupported method.
        method: Method,
    },

    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },

    /// A typed value could not be encoded or decoded.
    Codec {
        /// Codec failure description.
        reason: String,
    },

    /// A bounded retry policy ran out of attempts.
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last: Box<Error>,
    },

    /// The routing task went away without posting a response.
    Abandoned {
        /// The method that was in flight.
        method: Method,
    },
}

impl Retryable for Error {
    fn can_retry(&self) -> bool {
        match self {
            Self::FirstRangeMissing { .. }
            | Self::NodeAddrNotFound { .. }
            | Self::NoNodeAddrsAvailable { .. }
            | Self::Timeout { .. } => true,
            Self::Transport { retryable, .. } | Self::Remote { retryable, .. } => *retryable,
            Self::EmptyReplicaSet { .. }
            | Self::UnexpectedResponse { .. }
            | Self::NotImplemented { .. }
            | Self::InvalidArgument { .. }
            | Self::Codec { .. }
            | Self::RetriesExhausted { .. }
            | Self::Abandoned { .. } => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstRangeMissing { reason } => {
                write!(f, "first range not yet gossiped: {reason}")
            }
            Self::NodeAddrNotFound { node_id } => {
                write!(f, "unable to look up address for {node_id}")
            }
            Self::NoNodeAddrsAvailable { method } => {
                write!(f, "{method}: no replica node addresses available via gossip")
            }
            Self::EmptyReplicaSet { method } => write!(f, "{method}: replica set is empty"),
            Self::Timeout { method, waited_us } => {
                write!(f, "{method}: timed out after {waited_us}us")
            }
            Self::Transport {
                method,
                addr,
                reason,
                ..
            } => write!(f, "{method} to {addr} failed: {reason}"),
            Self::Remote { message, .. } => write!(f, "remote error: {message}"),
            Self::UnexpectedResponse { method } => {
                write!(f, "{method}: reply does not match request")
            }
            Self::NotImplemented { method } => write!(f, "{method} is not implemented"),
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::Codec { reason } => write!(f, "codec error: {reason}"),
            Self::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::Abandoned { method } => write!(f, "{method}: routing task ended without reply"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::FirstRangeMissing {
            reason: "not found".to_string()
        }
        .can_retry());
        assert!(Error::NoNodeAddrsAvailable { method: Method::Get }.can_retry());
        assert!(!Error::EmptyReplicaSet { method: Method::Get }.can_retry());
        assert!(!Error::NotImplemented { method: Method::Scan }.can_retry());

        let remote = |retryable| Error::Remote {
            message: "busy".to_string(),
            retryable,
        };
        assert!(remote(true).can_retry());
        assert!(!remote(false).can_retry());
    }

    #[test]
    fn test_error_display() {
        let err = Error::EmptyReplicaSet {
            method: Method::InternalRangeLookup,
        };
        assert_eq!(
            format!("{err}"),
            "Node.InternalRangeLookup: replica set is empty"
        );

        let err = Error::Timeout {
            method: Method::Put,
            waited_us: 15_000_000,
        };
        assert_eq!(format!("{err}"), "Node.Put: timed out after 15000000us");
    }
}
