//! Document store abstraction
//!
//! [`DocumentStore`] is the minimal verb set the versioning protocol needs
//! from a backing search/storage engine. Implementations are thin: they do
//! not retry, do not batch and do not interpret documents beyond what the
//! verb requires. Errors from the transport propagate unmodified.
//!
//! The trait mirrors the optimistic-concurrency model of Elasticsearch:
//! every document has a per-id `version` (incremented on each overwrite) and
//! a `(seq_no, primary_term)` pair that changes on every write and can be
//! used as a compare-and-swap token.

use crate::document::Document;
use crate::error::Result;
use crate::query::Query;
use serde::{Deserialize, Serialize};

/// Target and precondition of a single-document write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Store assigns a fresh identifier
    Auto,
    /// Create-or-overwrite at `id`
    Upsert(String),
    /// Create at `id`, `Conflict` if it already exists
    Create(String),
    /// Overwrite at `id` only if it is unchanged since it was read
    IfMatch {
        /// Document identifier
        id: String,
        /// Sequence number observed at read time
        seq_no: u64,
        /// Primary term observed at read time
        primary_term: u64,
    },
}

impl WriteMode {
    /// Target identifier, `None` for store-assigned ids
    pub fn id(&self) -> Option<&str> {
        match self {
            WriteMode::Auto => None,
            WriteMode::Upsert(id) | WriteMode::Create(id) => Some(id),
            WriteMode::IfMatch { id, .. } => Some(id),
        }
    }
}

/// Whether a write created or replaced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteResult {
    /// New document
    Created,
    /// Existing document overwritten
    Updated,
}

/// Acknowledgement of a single-document write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    /// Collection written to
    pub collection: String,
    /// Identifier of the written document
    pub id: String,
    /// Store-assigned per-document version after the write
    pub version: u64,
    /// Created or updated
    pub result: WriteResult,
    /// Sequence number of the write
    pub seq_no: u64,
    /// Primary term of the write
    pub primary_term: u64,
}

/// A stored document together with its store metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Store identifier
    pub id: String,
    /// Store-assigned per-document version
    pub version: u64,
    /// Sequence number of the last write
    pub seq_no: u64,
    /// Primary term of the last write
    pub primary_term: u64,
    /// The document itself
    pub source: Document,
}

/// Summary of a delete-by-query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteByQueryResponse {
    /// Documents matched by the query
    pub total: u64,
    /// Documents physically removed
    pub deleted: u64,
    /// Per-document failure descriptions
    #[serde(default)]
    pub failures: Vec<String>,
}

/// One action of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    /// Target id, `None` for store-assigned
    pub id: Option<String>,
    /// Document to index
    pub document: Document,
}

/// Per-action outcome of a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    /// Identifier the action wrote to (empty when the store assigned none)
    pub id: String,
    /// HTTP-style status of the action
    pub status: u16,
    /// Failure reason, if the action failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one bulk round trip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResponse {
    /// Whether any action failed
    pub errors: bool,
    /// Outcomes in request order
    pub items: Vec<BulkItemResult>,
}

/// Backing store verb set
///
/// All methods are blocking round trips. Implementations must be safe to
/// share across threads.
pub trait DocumentStore: Send + Sync {
    /// Whether a document with `id` exists; never an error for "not found"
    fn exists(&self, collection: &str, id: &str) -> Result<bool>;

    /// Fetch a document by id (realtime, ignores search visibility)
    fn get(&self, collection: &str, id: &str) -> Result<Option<Hit>>;

    /// Write one document
    fn index(&self, collection: &str, document: &Document, mode: &WriteMode)
        -> Result<IndexResponse>;

    /// All documents matching `query`, in store order
    fn search(&self, collection: &str, query: &Query) -> Result<Vec<Hit>>;

    /// Physically remove every document matching `query`
    fn delete_by_query(&self, collection: &str, query: &Query) -> Result<DeleteByQueryResponse>;

    /// Index many documents in one round trip
    fn bulk(&self, collection: &str, items: &[BulkItem]) -> Result<BulkResponse>;

    /// Make all acknowledged writes searchable
    fn refresh(&self, collection: &str) -> Result<()>;

    /// Create the collection with its minimal mapping; succeeds if it exists
    fn ensure_mapping(&self, collection: &str) -> Result<()>;
}
