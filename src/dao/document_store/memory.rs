use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::{
    dao::{
        document_store::{DocumentName, DocumentStore, EventDocument},
        storage::{StorageError, StorageResult},
    },
    state::match_state::MatchKey,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Address {
    Match(MatchKey, DocumentName),
    Event(String, EventDocument),
}

#[derive(Default)]
struct Inner {
    documents: DashMap<Address, Value>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

/// Volatile store keeping documents in a map. Used by tests and local demos.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a read-only event document.
    pub fn insert_event_document(&self, event_id: &str, document: EventDocument, value: Value) {
        self.inner
            .documents
            .insert(Address::Event(event_id.to_owned(), document), value);
    }

    /// Seed or replace a match document without counting it as a write.
    pub fn insert(&self, key: &MatchKey, name: DocumentName, value: Value) {
        self.inner
            .documents
            .insert(Address::Match(key.clone(), name), value);
    }

    pub fn get(&self, key: &MatchKey, name: DocumentName) -> Option<Value> {
        self.inner
            .documents
            .get(&Address::Match(key.clone(), name))
            .map(|entry| entry.value().clone())
    }

    /// Number of successful `save` calls.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::Acquire)
    }

    /// Make every subsequent `save` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::Release);
    }

    /// Make every subsequent `load` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::Release);
    }

    fn read(&self, address: Address) -> StorageResult<Option<Value>> {
        if self.inner.fail_reads.load(Ordering::Acquire) {
            return Err(offline("read"));
        }
        Ok(self
            .inner
            .documents
            .get(&address)
            .map(|entry| entry.value().clone()))
    }
}

fn offline(operation: &str) -> StorageError {
    StorageError::unavailable(
        format!("memory store {operation} disabled"),
        io::Error::new(io::ErrorKind::NotConnected, "offline"),
    )
}

impl DocumentStore for MemoryDocumentStore {
    fn load(
        &self,
        key: &MatchKey,
        name: DocumentName,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let result = self.read(Address::Match(key.clone(), name));
        Box::pin(async move { result })
    }

    fn save(
        &self,
        key: &MatchKey,
        name: DocumentName,
        document: Value,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let address = Address::Match(key.clone(), name);
        Box::pin(async move {
            if store.inner.fail_writes.load(Ordering::Acquire) {
                return Err(offline("write"));
            }
            store.inner.documents.insert(address, document);
            store.inner.writes.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }

    fn load_event_document(
        &self,
        event_id: &str,
        document: EventDocument,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let result = self.read(Address::Event(event_id.to_owned(), document));
        Box::pin(async move { result })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let healthy = !self.inner.fail_reads.load(Ordering::Acquire);
        Box::pin(async move {
            if healthy {
                Ok(())
            } else {
                Err(offline("health check"))
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}
