//! Chunked loading through the gateway.

use crate::common::*;
use esorm::{Gateway, QueryBuilder};

#[test]
fn bulk_load_then_version_individually() {
    let ts = TestSession::new();
    let gateway: &Gateway = ts.session.gateway();

    let docs: Vec<_> = (0..2500).map(|i| named(&format!("p{}", i), "A")).collect();
    let summary = gateway.bulk_insert("orm", &docs, true).unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.indexed, 2500);
    assert_eq!(summary.failed, 0);
    assert_eq!(ts.primary_count(), 2500);

    // Bulk-loaded documents are present, so identical inserts are no-ops
    // and changes continue from the store's version
    let ledger = ts.session.ledger();
    assert!(!ledger.insert(&named("p7", "A")).unwrap().was_written());
    assert_eq!(ledger.insert(&named("p7", "B")).unwrap().version(), Some(2));
}

#[test]
fn bulk_without_upsert_appends() {
    let ts = TestSession::new();
    let gateway = ts.session.gateway();
    gateway
        .bulk_insert("version", &[named("p1", "A"), named("p1", "A")], false)
        .unwrap();

    let hits = gateway
        .search("version", &QueryBuilder::match_field("data.uid", "p1"))
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_ne!(hits[0].id, hits[1].id);
}
