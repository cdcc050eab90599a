//! Gateway: document store access with write policy
//!
//! The gateway wraps any [`DocumentStore`] and adds the two policies the
//! versioning protocol relies on:
//!
//! - **Mapping on first write**: before the first single-document or bulk
//!   write into a collection, the minimal mapping is ensured. The result is
//!   cached per gateway, so the admin call happens once per collection.
//! - **Chunked bulk insert**: bulk writes are split into chunks of at most
//!   `bulk_chunk_size` actions (1000 by default). After every chunk the
//!   collection is refreshed so later reads in the same operation see it.
//!   Chunks carry no transactional meaning: a failure leaves earlier chunks
//!   committed and the rest unwritten.
//!
//! Reads and searches are plain pass-throughs.

use esorm_core::{
    BulkItem, DeleteByQueryResponse, Document, DocumentStore, Error, Hit, IndexResponse, Query,
    Result, WriteMode,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of actions per bulk round trip
pub const DEFAULT_BULK_CHUNK_SIZE: usize = 1000;

/// Summary of a chunked bulk insert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    /// Round trips issued
    pub batches: usize,
    /// Actions the store acknowledged
    pub indexed: usize,
    /// Actions the store rejected
    pub failed: usize,
}

/// Policy layer over a [`DocumentStore`]
#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn DocumentStore>,
    mapped: Arc<Mutex<HashSet<String>>>,
    bulk_chunk_size: usize,
}

impl Gateway {
    /// Wrap a store with the default bulk chunk size
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Gateway {
            store,
            mapped: Arc::new(Mutex::new(HashSet::new())),
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
        }
    }

    /// Override the bulk chunk size (must be non-zero)
    pub fn with_bulk_chunk_size(mut self, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::invalid_argument("bulk chunk size must be at least 1"));
        }
        self.bulk_chunk_size = size;
        Ok(self)
    }

    /// The wrapped store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Whether a document exists; "not found" is `Ok(false)`
    pub fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        self.store.exists(collection, id)
    }

    /// Fetch a document by id
    pub fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Hit>> {
        self.store.get(collection, id)
    }

    /// All documents matching `query`, in store order
    pub fn search(&self, collection: &str, query: &Query) -> Result<Vec<Hit>> {
        self.store.search(collection, query)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Write one document, ensuring the collection mapping first
    pub fn insert_one(
        &self,
        collection: &str,
        document: &Document,
        mode: &WriteMode,
    ) -> Result<IndexResponse> {
        self.ensure_mapping(collection)?;
        self.store.index(collection, document, mode)
    }

    /// Physically remove every document matching `query`
    pub fn delete_by_query(&self, collection: &str, query: &Query) -> Result<DeleteByQueryResponse> {
        self.store.delete_by_query(collection, query)
    }

    /// Index many documents in chunks, refreshing after each chunk
    ///
    /// With `upsert`, each document is written at its `data.uid` (a document
    /// without one is a caller error, detected before anything is sent);
    /// otherwise the store assigns identifiers.
    pub fn bulk_insert(
        &self,
        collection: &str,
        documents: &[Document],
        upsert: bool,
    ) -> Result<BulkSummary> {
        let items = documents
            .iter()
            .map(|document| {
                let id = if upsert {
                    Some(document.require_uid()?.to_string())
                } else {
                    None
                };
                Ok(BulkItem {
                    id,
                    document: document.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut summary = BulkSummary::default();
        if items.is_empty() {
            return Ok(summary);
        }

        self.ensure_mapping(collection)?;
        for chunk in items.chunks(self.bulk_chunk_size) {
            let response = self.store.bulk(collection, chunk)?;
            self.store.refresh(collection)?;

            let failed = response.items.iter().filter(|i| i.error.is_some()).count();
            summary.batches += 1;
            summary.failed += failed;
            summary.indexed += response.items.len() - failed;

            debug!(
                target: "esorm::gateway",
                collection,
                batch = summary.batches,
                actions = chunk.len(),
                failed,
                "Flushed bulk batch"
            );
            if failed > 0 {
                warn!(target: "esorm::gateway", collection, failed, "Bulk batch had rejected actions");
            }
        }
        Ok(summary)
    }

    /// Force a collection to become searchable
    pub fn refresh(&self, collection: &str) -> Result<()> {
        self.store.refresh(collection)
    }

    /// Ensure the collection mapping exists, once per gateway
    pub fn ensure_mapping(&self, collection: &str) -> Result<()> {
        if self.mapped.lock().contains(collection) {
            return Ok(());
        }
        self.store.ensure_mapping(collection)?;
        self.mapped.lock().insert(collection.to_string());
        debug!(target: "esorm::gateway", collection, "Ensured mapping");
        Ok(())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("bulk_chunk_size", &self.bulk_chunk_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use esorm_core::{BulkResponse, QueryBuilder};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls into the wrapped store
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStore,
        mappings: AtomicUsize,
        bulks: AtomicUsize,
        refreshes: AtomicUsize,
    }

    impl DocumentStore for CountingStore {
        fn exists(&self, c: &str, id: &str) -> Result<bool> {
            self.inner.exists(c, id)
        }
        fn get(&self, c: &str, id: &str) -> Result<Option<Hit>> {
            self.inner.get(c, id)
        }
        fn index(&self, c: &str, d: &Document, m: &WriteMode) -> Result<IndexResponse> {
            self.inner.index(c, d, m)
        }
        fn search(&self, c: &str, q: &Query) -> Result<Vec<Hit>> {
            self.inner.search(c, q)
        }
        fn delete_by_query(&self, c: &str, q: &Query) -> Result<DeleteByQueryResponse> {
            self.inner.delete_by_query(c, q)
        }
        fn bulk(&self, c: &str, items: &[BulkItem]) -> Result<BulkResponse> {
            self.bulks.fetch_add(1, Ordering::SeqCst);
            self.inner.bulk(c, items)
        }
        fn refresh(&self, c: &str) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.inner.refresh(c)
        }
        fn ensure_mapping(&self, c: &str) -> Result<()> {
            self.mappings.fetch_add(1, Ordering::SeqCst);
            self.inner.ensure_mapping(c)
        }
    }

    fn doc(uid: &str) -> Document {
        Document::new("Person", json!({"uid": uid}).as_object().cloned().unwrap())
    }

    #[test]
    fn test_mapping_ensured_once_per_collection() {
        let store = Arc::new(CountingStore::default());
        let gateway = Gateway::new(store.clone());

        for uid in ["a", "b", "c"] {
            gateway
                .insert_one("orm", &doc(uid), &WriteMode::Upsert(uid.into()))
                .unwrap();
        }
        gateway.insert_one("version", &doc("a"), &WriteMode::Auto).unwrap();

        assert_eq!(store.mappings.load(Ordering::SeqCst), 2);
        assert!(store.inner.has_mapping("orm"));
        assert!(store.inner.has_mapping("version"));
    }

    #[test]
    fn test_bulk_insert_chunks_and_refreshes() {
        let store = Arc::new(CountingStore::default());
        let gateway = Gateway::new(store.clone()).with_bulk_chunk_size(2).unwrap();

        let docs: Vec<Document> = (0..5).map(|i| doc(&format!("p{}", i))).collect();
        let summary = gateway.bulk_insert("orm", &docs, true).unwrap();

        assert_eq!(
            summary,
            BulkSummary {
                batches: 3,
                indexed: 5,
                failed: 0
            }
        );
        assert_eq!(store.bulks.load(Ordering::SeqCst), 3);
        assert_eq!(store.refreshes.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.document_count("orm"), 5);
    }

    #[test]
    fn test_bulk_insert_default_chunk_boundary() {
        let store = Arc::new(CountingStore::default());
        let gateway = Gateway::new(store.clone());

        let docs: Vec<Document> = (0..2001).map(|i| doc(&format!("p{}", i))).collect();
        let summary = gateway.bulk_insert("orm", &docs, true).unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.indexed, 2001);
    }

    #[test]
    fn test_bulk_upsert_overwrites_by_uid() {
        let store = Arc::new(InMemoryStore::with_deferred_refresh());
        let gateway = Gateway::new(store.clone());

        gateway.bulk_insert("orm", &[doc("p1"), doc("p1")], true).unwrap();
        assert_eq!(store.document_count("orm"), 1);

        // Refreshed by the gateway, so visible to search right away
        let hits = gateway
            .search("orm", &QueryBuilder::match_field("data.uid", "p1"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version, 2);
    }

    #[test]
    fn test_bulk_without_upsert_assigns_ids() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Gateway::new(store.clone());

        gateway.bulk_insert("version", &[doc("p1"), doc("p1")], false).unwrap();
        assert_eq!(store.document_count("version"), 2);
    }

    #[test]
    fn test_bulk_upsert_requires_uid() {
        let store = Arc::new(CountingStore::default());
        let gateway = Gateway::new(store.clone());

        let no_uid = Document::new("Person", serde_json::Map::new());
        let err = gateway.bulk_insert("orm", &[doc("p1"), no_uid], true).unwrap_err();
        assert!(matches!(err, Error::MissingUid));
        assert_eq!(store.bulks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let gateway = Gateway::new(Arc::new(InMemoryStore::new()));
        assert!(gateway.with_bulk_chunk_size(0).is_err());
    }
}
