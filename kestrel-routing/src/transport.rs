//! RPC transport abstraction.
//!
//! The transport delivers one request to one storage node and returns its
//! reply. Connection management and framing live behind this trait; the
//! replica sender builds the "first success among N targets" behavior on
//! top of it.

use std::net::SocketAddr;

use async_trait::async_trait;
use kestrel_core::api::{Method, Request, Response};
use kestrel_core::{Error, Retryable};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The node could not be reached.
    #[error("node at {addr} unreachable: {reason}")]
    Unreachable {
        /// Target address.
        addr: SocketAddr,
        /// Failure description.
        reason: String,
    },

    /// The connection dropped before the reply arrived.
    #[error("connection to {addr} reset")]
    ConnectionReset {
        /// Target address.
        addr: SocketAddr,
    },

    /// The request or reply could not be encoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The transport has been shut down.
    #[error("transport is shutdown")]
    Shutdown,
}

impl Retryable for TransportError {
    fn can_retry(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::ConnectionReset { .. } => true,
            Self::Codec(_) | Self::Shutdown => false,
        }
    }
}

impl TransportError {
    /// Converts into the routing error taxonomy, keeping the retry
    /// classification.
    #[must_use]
    pub fn into_error(self, method: Method, addr: SocketAddr) -> Error {
        Error::Transport {
            method,
            addr: addr.to_string(),
            retryable: self.can_retry(),
            reason: self.to_string(),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Sends requests to storage nodes.
///
/// Implementations must be `Send + Sync`; one transport is shared by every
/// routing task.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Sends `request` to the node at `addr` and waits for its reply.
    ///
    /// A reply whose error slot is set is still a successful call.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be delivered or no reply
    /// was received.
    async fn call(&self, addr: SocketAddr, request: Request) -> TransportResult<Response>;
}
