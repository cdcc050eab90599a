//! Shared test utilities for the scenario suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use esorm::{
    Document, EsormConfig, FieldValue, InMemoryStore, IntegerCodec, Schema, Session,
    StringCodec, UidCodec,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// A session over a fresh in-memory store, with the store handle kept for
/// fixtures and inspection.
pub struct TestSession {
    pub store: Arc<InMemoryStore>,
    pub session: Session,
}

impl TestSession {
    /// Default collections (`orm` / `version`), immediate search visibility.
    pub fn new() -> Self {
        Self::with_config(EsormConfig::default())
    }

    pub fn with_config(config: EsormConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let session = Session::with_store(store.clone(), config).expect("valid test config");
        TestSession { store, session }
    }

    pub fn primary_count(&self) -> usize {
        self.store.document_count(&self.session.config().primary_index)
    }

    pub fn version_count(&self) -> usize {
        self.store.document_count(&self.session.config().version_index)
    }
}

/// A `Person` document with the given JSON content under `data`.
pub fn person(data: Value) -> Document {
    Document::new(
        "Person",
        data.as_object().cloned().expect("data must be a JSON object"),
    )
}

/// `{"uid": uid, "name": name}` as a `Person` document.
pub fn named(uid: &str, name: &str) -> Document {
    person(json!({"uid": uid, "name": name}))
}

/// `Person { uid, name, age }` schema.
pub fn person_schema() -> Arc<Schema> {
    Schema::builder("Person")
        .field("uid", UidCodec)
        .field("name", StringCodec::new())
        .field("age", IntegerCodec::new())
        .build()
        .expect("valid schema")
}

pub fn text(s: &str) -> FieldValue {
    FieldValue::from(s)
}
