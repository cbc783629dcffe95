//! In-memory [`Db`] for unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use kestrel_core::api::{
    AccumulateTsRequest, AccumulateTsResponse, ContainsRequest, ContainsResponse,
    DeleteRangeRequest, DeleteRangeResponse, DeleteRequest, DeleteResponse, EndTransactionRequest,
    EndTransactionResponse, EnqueueMessageRequest, EnqueueMessageResponse, EnqueueUpdateRequest,
    EnqueueUpdateResponse, GetRequest, GetResponse, IncrementRequest, IncrementResponse,
    PutRequest, PutResponse, ReapQueueRequest, ReapQueueResponse, RoutedRequest, RoutedResponse,
    ScanRequest, ScanResponse,
};
use kestrel_core::{Error, Key, Value};
use kestrel_routing::Completion;

use crate::db::Db;

/// Single-node map that serves `get`, `put` and `contains`.
#[derive(Debug, Default)]
pub struct MemDb {
    values: Mutex<BTreeMap<Key, Value>>,
    failure: Mutex<Option<Error>>,
}

impl MemDb {
    pub fn insert_raw(&self, key: &'static str, value: Value) {
        self.values.lock().unwrap().insert(Key::from(key), value);
    }

    pub fn fail_with(&self, err: Error) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn keys(&self) -> Vec<Key> {
        self.values.lock().unwrap().keys().cloned().collect()
    }

    fn reply<R: RoutedRequest>(
        &self,
        f: impl FnOnce(&mut BTreeMap<Key, Value>) -> R::Response,
    ) -> Completion<R::Response> {
        let response = match self.failure.lock().unwrap().clone() {
            Some(err) => R::Response::from_error(err),
            None => f(&mut self.values.lock().unwrap()),
        };
        Completion::ready(R::METHOD, response)
    }

    fn unsupported<R: RoutedRequest>() -> Completion<R::Response> {
        Completion::failed(R::METHOD, Error::NotImplemented { method: R::METHOD })
    }
}

impl Db for MemDb {
    fn contains(&self, request: ContainsRequest) -> Completion<ContainsResponse> {
        self.reply::<ContainsRequest>(|values| ContainsResponse {
            exists: values.contains_key(&request.key),
            ..ContainsResponse::default()
        })
    }

    fn get(&self, request: GetRequest) -> Completion<GetResponse> {
        self.reply::<GetRequest>(|values| GetResponse {
            value: values.get(&request.key).cloned(),
            ..GetResponse::default()
        })
    }

    fn put(&self, request: PutRequest) -> Completion<PutResponse> {
        self.reply::<PutRequest>(|values| {
            values.insert(request.key, request.value);
            PutResponse::default()
        })
    }

    fn increment(&self, _request: IncrementRequest) -> Completion<IncrementResponse> {
        Self::unsupported::<IncrementRequest>()
    }

    fn delete(&self, _request: DeleteRequest) -> Completion<DeleteResponse> {
        Self::unsupported::<DeleteRequest>()
    }

    fn delete_range(&self, _request: DeleteRangeRequest) -> Completion<DeleteRangeResponse> {
        Self::unsupported::<DeleteRangeRequest>()
    }

    fn scan(&self, _request: ScanRequest) -> Completion<ScanResponse> {
        Self::unsupported::<ScanRequest>()
    }

    fn end_transaction(
        &self,
        _request: EndTransactionRequest,
    ) -> Completion<EndTransactionResponse> {
        Self::unsupported::<EndTransactionRequest>()
    }

    fn accumulate_ts(&self, _request: AccumulateTsRequest) -> Completion<AccumulateTsResponse> {
        Self::unsupported::<AccumulateTsRequest>()
    }

    fn reap_queue(&self, _request: ReapQueueRequest) -> Completion<ReapQueueResponse> {
        Self::unsupported::<ReapQueueRequest>()
    }

    fn enqueue_update(&self, _request: EnqueueUpdateRequest) -> Completion<EnqueueUpdateResponse> {
        Self::unsupported::<EnqueueUpdateRequest>()
    }

    fn enqueue_message(
        &self,
        _request: EnqueueMessageRequest,
    ) -> Completion<EnqueueMessageResponse> {
        Self::unsupported::<EnqueueMessageRequest>()
    }
}
