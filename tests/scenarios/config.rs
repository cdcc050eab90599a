//! File-driven session setup.

use crate::common::*;
use esorm::{EsormConfig, InMemoryStore, Session, CONFIG_FILE_NAME};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn session_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "primary_index = \"people\"\nversion_index = \"people_history\"\nmax_write_attempts = 5\n",
    )
    .unwrap();

    let config = EsormConfig::from_file(&path).unwrap();
    let store = Arc::new(InMemoryStore::new());
    let session = Session::with_store(store.clone(), config).unwrap();

    session.ledger().insert(&named("p1", "A")).unwrap();
    assert_eq!(store.document_count("people"), 1);
    assert_eq!(store.document_count("people_history"), 1);
    assert_eq!(session.ledger().config().max_write_attempts, 5);
}

#[test]
fn default_file_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    EsormConfig::write_default_if_missing(&path).unwrap();

    let config = EsormConfig::from_file(&path).unwrap();
    assert_eq!(config, EsormConfig::default());
    Session::connect(&config).unwrap();
}
