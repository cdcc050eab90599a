//! Core types and traits for esorm
//!
//! This crate defines the foundational types used throughout the system:
//! - Document, Meta: the stored document shape shared by both collections
//! - GeoPoint: geographic coordinate with distance calculation
//! - Query, QueryBuilder, Criterion: structured "must match" predicates
//! - DocumentStore: backing store verb set, with its request/response types
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod query;
pub mod store;

pub use document::{DataRecord, Document, GeoPoint, Meta, COORDINATES_FIELD, UID_FIELD};
pub use error::{Error, Result};
pub use query::{Criterion, FieldMatch, GeoDistance, Query, QueryBuilder, GEO_NEAR_FIELD};
pub use store::{
    BulkItem, BulkItemResult, BulkResponse, DeleteByQueryResponse, DocumentStore, Hit,
    IndexResponse, WriteMode, WriteResult,
};
