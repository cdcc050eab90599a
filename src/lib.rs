//! esorm - versioned object-document mapping over Elasticsearch
//!
//! Typed entities are stored as one document per `uid` in a primary
//! collection, and every content change is appended to a version collection
//! stamped with the version the store assigned to the write. Deletes are
//! tombstones; history stays queryable until a version is erased explicitly.
//!
//! # Quick Start
//!
//! ```ignore
//! use esorm::{Entities, EsormConfig, FieldValue, Schema, Session, StringCodec, UidCodec};
//!
//! let session = Session::connect(&EsormConfig::default().with_env_overrides()?)?;
//! let person = Schema::builder("Person")
//!     .field("uid", UidCodec)
//!     .field("name", StringCodec::new())
//!     .build()?;
//! let people = Entities::new(&session, person);
//!
//! let mut p = people.create([("name", FieldValue::from("A"))])?;
//! people.save(&p)?;                      // version 1
//! p.set("name", "B")?;
//! people.save(&p)?;                      // version 2
//! let first = people.load_version(&p, 1)?;
//! ```
//!
//! # Architecture
//!
//! - `esorm-core`: document model, errors, predicates, backend trait
//! - `esorm-storage`: gateway policy, in-memory and HTTP backends
//! - `esorm-engine`: version ledger, visibility fence, config, session
//! - `esorm-entity`: field codecs, schemas, typed entities, repositories

pub use esorm_core::{
    BulkItem, BulkItemResult, BulkResponse, Criterion, DataRecord, DeleteByQueryResponse,
    Document, DocumentStore, Error, FieldMatch, GeoDistance, GeoPoint, Hit, IndexResponse, Meta,
    Query, QueryBuilder, Result, WriteMode, WriteResult, COORDINATES_FIELD, GEO_NEAR_FIELD,
    UID_FIELD,
};
pub use esorm_engine::{
    DeleteReport, EsormConfig, InsertOutcome, LedgerConfig, Session, VersionLedger, VersionWrite,
    VisibilityConfig, VisibilityFence, CONFIG_FILE_NAME, ENV_HOST, ENV_PORT,
};
pub use esorm_entity::{
    ArrayCodec, BooleanCodec, DateTimeCodec, Entities, Entity, FieldCodec, FieldKind, FieldValue,
    FloatCodec, GeoPointCodec, IntegerCodec, JsonCodec, Schema, SchemaBuilder, StringCodec,
    UidCodec,
};
pub use esorm_storage::{
    default_mapping, BulkSummary, Gateway, HttpStore, HttpStoreConfig, InMemoryStore,
    DEFAULT_BULK_CHUNK_SIZE, DEFAULT_SEARCH_SIZE,
};
