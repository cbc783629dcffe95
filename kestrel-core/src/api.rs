//! Request and response types for the storage-node RPC surface.
//!
//! Every operation is a request/response pair. Requests carry the key that
//! routes them plus a header whose replica slot is stamped by the router
//! right before each send, so the receiving node can check it actually holds
//! the addressed replica. Responses carry the result payload and an error
//! slot.
//!
//! The [`RoutedRequest`] and [`RoutedResponse`] traits give the router the
//! two capabilities it needs ("copy with replica" and "fail with error")
//! without knowing the concrete operation.

use std::fmt;

use bytes::Bytes;

use crate::error::Error;
use crate::key::Key;
use crate::range::{RangeLocations, Replica, Value};

/// Storage-node methods, one per operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Key existence check.
    Contains,
    /// Point read.
    Get,
    /// Point write.
    Put,
    /// Atomic integer increment.
    Increment,
    /// Point delete.
    Delete,
    /// Delete of a key range.
    DeleteRange,
    /// Range read.
    Scan,
    /// Commit or abort a transaction.
    EndTransaction,
    /// Time-series accumulation.
    AccumulateTs,
    /// Reap messages from an inbox queue.
    ReapQueue,
    /// Enqueue an update for eventual execution.
    EnqueueUpdate,
    /// Enqueue a message into an inbox.
    EnqueueMessage,
    /// Range metadata lookup.
    InternalRangeLookup,
}

impl Method {
    /// Returns the RPC method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "Node.Contains",
            Self::Get => "Node.Get",
            Self::Put => "Node.Put",
            Self::Increment => "Node.Increment",
            Self::Delete => "Node.Delete",
            Self::DeleteRange => "Node.DeleteRange",
            Self::Scan => "Node.Scan",
            Self::EndTransaction => "Node.EndTransaction",
            Self::AccumulateTs => "Node.AccumulateTS",
            Self::ReapQueue => "Node.ReapQueue",
            Self::EnqueueUpdate => "Node.EnqueueUpdate",
            Self::EnqueueMessage => "Node.EnqueueMessage",
            Self::InternalRangeLookup => "Node.InternalRangeLookup",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields common to every request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestHeader {
    /// The replica this copy of the request is addressed to.
    pub replica: Option<Replica>,
    /// Enclosing transaction, if any.
    pub txn_id: Option<Bytes>,
}

/// Fields common to every response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHeader {
    /// Set when the operation failed.
    pub error: Option<Error>,
}

/// A request the router can dispatch.
pub trait RoutedRequest: Clone + Send + Sync + 'static {
    /// The matching response type.
    type Response: RoutedResponse;

    /// The storage-node method serving this request.
    const METHOD: Method;

    /// Returns the key that determines which range serves the request, or
    /// `None` if the request names no key at all.
    fn routing_key(&self) -> Option<&Key>;

    /// Returns the request header.
    fn header(&self) -> &RequestHeader;

    /// Returns the request header for modification.
    fn header_mut(&mut self) -> &mut RequestHeader;

    /// Wraps the request for the transport.
    fn into_request(self) -> Request;

    /// Returns a copy of the request addressed to `replica`.
    #[must_use]
    fn with_replica(&self, replica: Replica) -> Self {
        let mut copy = self.clone();
        copy.header_mut().replica = Some(replica);
        copy
    }
}

/// A response the router can deliver.
pub trait RoutedResponse: Default + Send + 'static {
    /// Returns the response header.
    fn header(&self) -> &ResponseHeader;

    /// Returns the response header for modification.
    fn header_mut(&mut self) -> &mut ResponseHeader;

    /// Unwraps a transport response, or returns it unchanged if it belongs
    /// to another method.
    ///
    /// # Errors
    ///
    /// Returns the original response when the variant does not match.
    fn from_response(response: Response) -> Result<Self, Response>;

    /// Wraps the response for the transport.
    fn into_response(self) -> Response;

    /// Returns the error, if the operation failed.
    fn error(&self) -> Option<&Error> {
        self.header().error.as_ref()
    }

    /// Marks the response as failed.
    fn set_error(&mut self, err: Error) {
        self.header_mut().error = Some(err);
    }

    /// Builds an empty response carrying `err`.
    #[must_use]
    fn from_error(err: Error) -> Self {
        let mut response = Self::default();
        response.set_error(err);
        response
    }
}

/// Generates the transport enums and the trait impls for each
/// request/response pair.
macro_rules! routed_operations {
    ($($method:ident => $req:ident, $resp:ident;)*) => {
        /// Any request, as handed to the transport.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Request {
            $(
                #[doc = concat!("A `", stringify!($req), "`.")]
                $method($req),
            )*
        }

        /// Any response, as returned by the transport.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Response {
            $(
                #[doc = concat!("A `", stringify!($resp), "`.")]
                $method($resp),
            )*
        }

        impl Request {
            /// Returns the method serving this request.
            #[must_use]
            pub const fn method(&self) -> Method {
                match self {
                    $(Self::$method(_) => Method::$method,)*
                }
            }

            /// Returns the request header.
            #[must_use]
            pub const fn header(&self) -> &RequestHeader {
                match self {
                    $(Self::$method(r) => &r.header,)*
                }
            }
        }

        impl Response {
            /// Returns the method this response answers.
            #[must_use]
            pub const fn method(&self) -> Method {
                match self {
                    $(Self::$method(_) => Method::$method,)*
                }
            }

            /// Returns the error carried by the response, if any.
            #[must_use]
            pub const fn error(&self) -> Option<&Error> {
                match self {
                    $(Self::$method(r) => r.header.error.as_ref(),)*
                }
            }
        }

        $(
            impl RoutedResponse for $resp {
                fn header(&self) -> &ResponseHeader {
                    &self.header
                }

                fn header_mut(&mut self) -> &mut ResponseHeader {
                    &mut self.header
                }

                fn from_response(response: Response) -> Result<Self, Response> {
                    match response {
                        Response::$method(r) => Ok(r),
                        #[allow(unreachable_patterns)]
                        other => Err(other),
                    }
                }

                fn into_response(self) -> Response {
                    Response::$method(self)
                }
            }
        )*
    };
}

routed_operations! {
    Contains => ContainsRequest, ContainsResponse;
    Get => GetRequest, GetResponse;
    Put => PutRequest, PutResponse;
    Increment => IncrementRequest, IncrementResponse;
    Delete => DeleteRequest, DeleteResponse;
    DeleteRange => DeleteRangeRequest, DeleteRangeResponse;
    Scan => ScanRequest, ScanResponse;
    EndTransaction => EndTransactionRequest, EndTransactionResponse;
    AccumulateTs => AccumulateTsRequest, AccumulateTsResponse;
    ReapQueue => ReapQueueRequest, ReapQueueResponse;
    EnqueueUpdate => EnqueueUpdateRequest, EnqueueUpdateResponse;
    EnqueueMessage => EnqueueMessageRequest, EnqueueMessageResponse;
    InternalRangeLookup => InternalRangeLookupRequest, InternalRangeLookupResponse;
}

/// Implements [`RoutedRequest`] for a request routed by one of its fields.
macro_rules! impl_routed_request {
    ($req:ident => $resp:ident, $method:ident, |$r:ident| $routing_key:expr) => {
        impl RoutedRequest for $req {
            type Response = $resp;

            const METHOD: Method = Method::$method;

            fn routing_key(&self) -> Option<&Key> {
                let $r = self;
                $routing_key
            }

            fn header(&self) -> &RequestHeader {
                &self.header
            }

            fn header_mut(&mut self) -> &mut RequestHeader {
                &mut self.header
            }

            fn into_request(self) -> Request {
                Request::$method(self)
            }
        }
    };
}

impl_routed_request!(ContainsRequest => ContainsResponse, Contains, |r| Some(&r.key));
impl_routed_request!(GetRequest => GetResponse, Get, |r| Some(&r.key));
impl_routed_request!(PutRequest => PutResponse, Put, |r| Some(&r.key));
impl_routed_request!(IncrementRequest => IncrementResponse, Increment, |r| Some(&r.key));
impl_routed_request!(DeleteRequest => DeleteResponse, Delete, |r| Some(&r.key));
// Multi-key operations route by their first boundary key only.
impl_routed_request!(DeleteRangeRequest => DeleteRangeResponse, DeleteRange, |r| Some(&r.start_key));
impl_routed_request!(ScanRequest => ScanResponse, Scan, |r| Some(&r.start_key));
impl_routed_request!(EndTransactionRequest => EndTransactionResponse, EndTransaction, |r| r.keys.first());
impl_routed_request!(AccumulateTsRequest => AccumulateTsResponse, AccumulateTs, |r| Some(&r.key));
impl_routed_request!(ReapQueueRequest => ReapQueueResponse, ReapQueue, |r| Some(&r.inbox));
impl_routed_request!(EnqueueUpdateRequest => EnqueueUpdateResponse, EnqueueUpdate, |r| Some(&r.key));
impl_routed_request!(EnqueueMessageRequest => EnqueueMessageResponse, EnqueueMessage, |r| Some(&r.inbox));
impl_routed_request!(InternalRangeLookupRequest => InternalRangeLookupResponse, InternalRangeLookup, |r| Some(&r.key));

/// Checks whether a key exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainsRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Key to check.
    pub key: Key,
}

/// Reply to [`ContainsRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainsResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// Whether the key exists.
    pub exists: bool,
}

/// Reads the value at a key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Key to read.
    pub key: Key,
}

/// Reply to [`GetRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// The stored value, `None` if the key is absent.
    pub value: Option<Value>,
}

/// Writes a value at a key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PutRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Key to write.
    pub key: Key,
    /// Value to store.
    pub value: Value,
}

/// Reply to [`PutRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PutResponse {
    /// Common response fields.
    pub header: ResponseHeader,
}

/// Atomically adds to an integer value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncrementRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Key holding the integer.
    pub key: Key,
    /// Amount to add (may be negative).
    pub increment: i64,
}

/// Reply to [`IncrementRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncrementResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// Value after the increment.
    pub new_value: i64,
}

/// Deletes a key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Key to delete.
    pub key: Key,
}

/// Reply to [`DeleteRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteResponse {
    /// Common response fields.
    pub header: ResponseHeader,
}

/// Deletes all keys in `[start_key, end_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteRangeRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// First key to delete (inclusive).
    pub start_key: Key,
    /// End of the span (exclusive).
    pub end_key: Key,
    /// Upper bound on deleted entries; zero means no bound.
    pub max_entries_to_delete: u64,
}

/// Reply to [`DeleteRangeRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteRangeResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// Number of entries deleted.
    pub num_deleted: u64,
}

/// Reads all keys in `[start_key, end_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// First key to read (inclusive).
    pub start_key: Key,
    /// End of the span (exclusive).
    pub end_key: Key,
    /// Upper bound on returned rows; zero means no bound.
    pub max_results: u64,
}

/// Reply to [`ScanRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// Rows in key order.
    pub rows: Vec<(Key, Value)>,
}

/// Commits or aborts a transaction touching `keys`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndTransactionRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Keys written by the transaction.
    pub keys: Vec<Key>,
    /// True to commit, false to abort.
    pub commit: bool,
}

/// Reply to [`EndTransactionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndTransactionResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// Commit time in unix nanoseconds; zero on abort.
    pub commit_timestamp: i64,
}

/// Adds per-slot counts to a time-series value.
///
/// A key might hold one minute of data as 60 counts, one per second.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccumulateTsRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Time-series key.
    pub key: Key,
    /// Counts to add, one per sub-interval.
    pub counts: Vec<i64>,
}

/// Reply to [`AccumulateTsRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccumulateTsResponse {
    /// Common response fields.
    pub header: ResponseHeader,
}

/// Scans and deletes messages from an inbox. Must run inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReapQueueRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Inbox key.
    pub inbox: Key,
    /// Upper bound on reaped messages.
    pub max_results: u64,
}

/// Reply to [`ReapQueueRequest`]. Fewer than `max_results` messages means
/// the queue is now empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReapQueueResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// Reaped messages.
    pub messages: Vec<Value>,
}

/// Enqueues an update for eventual execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnqueueUpdateRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Key the update applies to.
    pub key: Key,
    /// Encoded update.
    pub update: Bytes,
}

/// Reply to [`EnqueueUpdateRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnqueueUpdateResponse {
    /// Common response fields.
    pub header: ResponseHeader,
}

/// Enqueues a message for delivery to an inbox.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnqueueMessageRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Inbox key.
    pub inbox: Key,
    /// Message to deliver.
    pub message: Value,
}

/// Reply to [`EnqueueMessageRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnqueueMessageResponse {
    /// Common response fields.
    pub header: ResponseHeader,
}

/// Looks up the range metadata entry covering `key`.
///
/// `key` is a metadata key (level-1 or level-2 prefix plus the key being
/// located); the node answers with the first entry whose key sorts after it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalRangeLookupRequest {
    /// Common request fields.
    pub header: RequestHeader,
    /// Metadata key to look up.
    pub key: Key,
}

/// Reply to [`InternalRangeLookupRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalRangeLookupResponse {
    /// Common response fields.
    pub header: ResponseHeader,
    /// Locations of the range covering the looked-up key.
    pub locations: RangeLocations,
}

impl ContainsRequest {
    /// Creates an existence check for `key`.
    #[must_use]
    pub fn new(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

impl GetRequest {
    /// Creates a read of `key`.
    #[must_use]
    pub fn new(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

impl PutRequest {
    /// Creates a write of `value` at `key`.
    #[must_use]
    pub fn new(key: impl Into<Key>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            ..Self::default()
        }
    }
}

impl IncrementRequest {
    /// Creates an increment of `key` by `increment`.
    #[must_use]
    pub fn new(key: impl Into<Key>, increment: i64) -> Self {
        Self {
            key: key.into(),
            increment,
            ..Self::default()
        }
    }
}

impl DeleteRequest {
    /// Creates a delete of `key`.
    #[must_use]
    pub fn new(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

impl InternalRangeLookupRequest {
    /// Creates a metadata lookup for `key`.
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    #[test]
    fn test_with_replica_leaves_original_untouched() {
        let request = GetRequest::new("apple");
        let replica = Replica::new(NodeId::new(3));

        let addressed = request.with_replica(replica);

        assert_eq!(addressed.header.replica, Some(replica));
        assert_eq!(request.header.replica, None);
        assert_eq!(addressed.key, request.key);
    }

    #[test]
    fn test_from_error_sets_error_slot() {
        let response = PutResponse::from_error(Error::NotImplemented { method: Method::Put });
        assert!(matches!(response.error(), Some(Error::NotImplemented { .. })));
    }

    #[test]
    fn test_from_response_rejects_other_methods() {
        let response = PutResponse::default().into_response();
        assert_eq!(response.method(), Method::Put);

        let back = GetResponse::from_response(response);
        assert!(back.is_err());
    }

    #[test]
    fn test_routing_keys() {
        let txn = EndTransactionRequest {
            keys: vec![Key::from("b"), Key::from("a")],
            ..EndTransactionRequest::default()
        };
        assert_eq!(txn.routing_key(), Some(&Key::from("b")));
        assert_eq!(EndTransactionRequest::default().routing_key(), None);

        let reap = ReapQueueRequest {
            inbox: Key::from("inbox"),
            ..ReapQueueRequest::default()
        };
        assert_eq!(reap.routing_key(), Some(&Key::from("inbox")));
    }

    #[test]
    fn test_request_enum_method() {
        let request = DeleteRangeRequest::default().into_request();
        assert_eq!(request.method(), Method::DeleteRange);
        assert_eq!(request.method().as_str(), "Node.DeleteRange");
    }
}
