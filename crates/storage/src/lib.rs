//! Storage layer for esorm
//!
//! This crate implements the Document Store Gateway and its backends:
//! - Gateway: mapping-on-first-write and chunked, refresh-forcing bulk insert
//!   over any `DocumentStore`
//! - InMemoryStore: in-process backend with store-compatible versioning and
//!   optional deferred search visibility
//! - HttpStore: Elasticsearch REST backend over a blocking HTTP agent

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gateway;
pub mod http;
pub mod memory;

pub use gateway::{BulkSummary, Gateway, DEFAULT_BULK_CHUNK_SIZE};
pub use http::{default_mapping, HttpStore, HttpStoreConfig, DEFAULT_SEARCH_SIZE};
pub use memory::InMemoryStore;
