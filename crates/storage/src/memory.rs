//! InMemoryStore: reference backend with store-compatible versioning
//!
//! Behaves like a single-node search engine as far as the versioning
//! protocol can observe:
//!
//! - every document has a `version` starting at 1 and incremented on each
//!   overwrite of the same id
//! - every write takes the next collection-wide `seq_no`; `primary_term`
//!   is always 1
//! - `get`/`exists` are realtime
//! - `search` sees writes immediately, or, with
//!   [`InMemoryStore::with_deferred_refresh`], only once `refresh` has run
//! - search results come back in order of each document's first write
//!
//! # Thread Safety
//!
//! All state sits behind one `parking_lot::RwLock`; the store is
//! `Send + Sync` and can be shared through an `Arc`.

use esorm_core::{
    BulkItem, BulkItemResult, BulkResponse, DeleteByQueryResponse, Document, DocumentStore,
    Error, Hit, IndexResponse, Query, Result, WriteMode, WriteResult,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

const PRIMARY_TERM: u64 = 1;

#[derive(Debug, Clone)]
struct StoredDoc {
    source: Value,
    version: u64,
    seq_no: u64,
}

/// Ordered id → document map
#[derive(Debug, Clone, Default)]
struct DocTable {
    docs: HashMap<String, StoredDoc>,
    order: Vec<String>,
}

impl DocTable {
    fn get(&self, id: &str) -> Option<&StoredDoc> {
        self.docs.get(id)
    }

    fn put(&mut self, id: &str, doc: StoredDoc) {
        if self.docs.insert(id.to_string(), doc).is_none() {
            self.order.push(id.to_string());
        }
    }

    fn remove(&mut self, id: &str) {
        if self.docs.remove(id).is_some() {
            self.order.retain(|existing| existing != id);
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &StoredDoc)> {
        self.order
            .iter()
            .filter_map(move |id| self.docs.get(id).map(|doc| (id, doc)))
    }

    fn len(&self) -> usize {
        self.docs.len()
    }
}

#[derive(Debug, Default)]
struct Collection {
    /// Acknowledged writes
    live: DocTable,
    /// Searchable view, only maintained in deferred mode
    published: DocTable,
    next_seq_no: u64,
    mapped: bool,
}

/// In-process document store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    deferred_refresh: bool,
}

impl InMemoryStore {
    /// Store whose writes are searchable immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose writes become searchable only after `refresh`
    pub fn with_deferred_refresh() -> Self {
        InMemoryStore {
            collections: RwLock::new(HashMap::new()),
            deferred_refresh: true,
        }
    }

    /// Number of documents in a collection (realtime)
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |c| c.live.len())
    }

    /// Whether `ensure_mapping` has been applied to the collection
    pub fn has_mapping(&self, collection: &str) -> bool {
        self.collections
            .read()
            .get(collection)
            .is_some_and(|c| c.mapped)
    }

    fn to_hit(id: &str, doc: &StoredDoc) -> Result<Hit> {
        Ok(Hit {
            id: id.to_string(),
            version: doc.version,
            seq_no: doc.seq_no,
            primary_term: PRIMARY_TERM,
            source: Document::from_value(doc.source.clone())?,
        })
    }

    /// Apply one write to a collection, enforcing the write mode's precondition
    fn write(
        collection_name: &str,
        collection: &mut Collection,
        source: Value,
        mode: &WriteMode,
        deferred: bool,
    ) -> Result<IndexResponse> {
        let id = match mode.id() {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        let existing = collection.live.get(&id);

        let conflict = || Error::Conflict {
            collection: collection_name.to_string(),
            id: id.clone(),
        };
        match (mode, existing) {
            (WriteMode::Create(_), Some(_)) => return Err(conflict()),
            (WriteMode::IfMatch { .. }, None) => return Err(conflict()),
            (
                WriteMode::IfMatch {
                    seq_no,
                    primary_term,
                    ..
                },
                Some(doc),
            ) if doc.seq_no != *seq_no || *primary_term != PRIMARY_TERM => {
                return Err(conflict())
            }
            _ => {}
        }

        let (version, result) = match existing {
            Some(doc) => (doc.version + 1, WriteResult::Updated),
            None => (1, WriteResult::Created),
        };
        let seq_no = collection.next_seq_no;
        collection.next_seq_no += 1;

        let stored = StoredDoc {
            source,
            version,
            seq_no,
        };
        collection.live.put(&id, stored.clone());
        if !deferred {
            collection.published.put(&id, stored);
        }

        Ok(IndexResponse {
            collection: collection_name.to_string(),
            id,
            version,
            result,
            seq_no,
            primary_term: PRIMARY_TERM,
        })
    }
}

impl DocumentStore for InMemoryStore {
    fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .is_some_and(|c| c.live.get(id).is_some()))
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Hit>> {
        let collections = self.collections.read();
        match collections.get(collection).and_then(|c| c.live.get(id)) {
            Some(doc) => Ok(Some(Self::to_hit(id, doc)?)),
            None => Ok(None),
        }
    }

    fn index(
        &self,
        collection: &str,
        document: &Document,
        mode: &WriteMode,
    ) -> Result<IndexResponse> {
        let source = document.to_value()?;
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();
        Self::write(collection, entry, source, mode, self.deferred_refresh)
    }

    fn search(&self, collection: &str, query: &Query) -> Result<Vec<Hit>> {
        let collections = self.collections.read();
        let Some(c) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        c.published
            .iter()
            .filter(|(_, doc)| query.matches(&doc.source))
            .map(|(id, doc)| Self::to_hit(id, doc))
            .collect()
    }

    fn delete_by_query(&self, collection: &str, query: &Query) -> Result<DeleteByQueryResponse> {
        let mut collections = self.collections.write();
        let Some(c) = collections.get_mut(collection) else {
            return Ok(DeleteByQueryResponse::default());
        };

        let ids: Vec<String> = c
            .published
            .iter()
            .filter(|(_, doc)| query.matches(&doc.source))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            c.live.remove(id);
            c.published.remove(id);
        }

        let count = ids.len() as u64;
        debug!(target: "esorm::memory", collection, deleted = count, "delete_by_query");
        Ok(DeleteByQueryResponse {
            total: count,
            deleted: count,
            failures: Vec::new(),
        })
    }

    fn bulk(&self, collection: &str, items: &[BulkItem]) -> Result<BulkResponse> {
        let sources = items
            .iter()
            .map(|item| item.document.to_value())
            .collect::<Result<Vec<_>>>()?;

        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_string()).or_default();

        let mut response = BulkResponse::default();
        for (item, source) in items.iter().zip(sources) {
            let mode = match &item.id {
                Some(id) => WriteMode::Upsert(id.clone()),
                None => WriteMode::Auto,
            };
            let ack = Self::write(collection, entry, source, &mode, self.deferred_refresh)?;
            response.items.push(BulkItemResult {
                id: ack.id,
                status: match ack.result {
                    WriteResult::Created => 201,
                    WriteResult::Updated => 200,
                },
                error: None,
            });
        }
        Ok(response)
    }

    fn refresh(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write();
        if let Some(c) = collections.get_mut(collection) {
            c.published = c.live.clone();
        }
        Ok(())
    }

    fn ensure_mapping(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write();
        collections.entry(collection.to_string()).or_default().mapped = true;
        Ok(())
    }
}
