//! The canonical walk through every ledger operation.

use crate::common::*;
use esorm::{InsertOutcome, WriteResult};
use serde_json::{json, Value};

#[test]
fn insert_update_delete_erase() {
    let ts = TestSession::new();
    let ledger = ts.session.ledger();

    // First write: version 1
    let first = ledger.insert(&named("p1", "A")).unwrap();
    assert!(first.was_written());
    assert_eq!(first.version(), Some(1));
    assert_eq!(first.write().unwrap().primary.result, WriteResult::Created);

    // Identical content: nothing written
    let again = ledger.insert(&named("p1", "A")).unwrap();
    assert_eq!(again, InsertOutcome::Unchanged);
    assert!(!again.was_written());

    // Changed content: version 2
    let second = ledger.insert(&named("p1", "B")).unwrap();
    assert_eq!(second.version(), Some(2));

    let mut versions = ledger.get_all_versions("p1").unwrap();
    versions.sort_unstable();
    assert_eq!(versions, vec![1, 2]);

    // Delete tombstones the primary and both versions
    ledger.delete("p1").unwrap();
    let current = ledger.get_current("p1").unwrap().unwrap();
    assert!(current.source.is_deleted());
    for v in [1, 2] {
        let record = ledger.get_doc_by_version("p1", v).unwrap().unwrap();
        assert!(record.source.is_deleted(), "version {} not tombstoned", v);
    }

    // Erase version 1 physically
    ledger.delete_version("p1", 1).unwrap();
    assert_eq!(ledger.get_all_versions("p1").unwrap(), vec![2]);
    assert!(ledger.get_doc_by_version("p1", 1).unwrap().is_none());

    assert_eq!(ts.primary_count(), 1);
    assert_eq!(ts.version_count(), 1);
}

#[test]
fn version_records_carry_stamped_content() {
    let ts = TestSession::new();
    let ledger = ts.session.ledger();
    ledger.insert(&named("p1", "A")).unwrap();
    ledger.insert(&named("p1", "B")).unwrap();

    let history = ledger.history("p1").unwrap();
    let names: Vec<_> = history
        .iter()
        .map(|h| (h.source.version(), h.source.data["name"].clone()))
        .collect();
    let expected: Vec<(Option<u64>, Value)> = vec![(Some(1), json!("A")), (Some(2), json!("B"))];
    assert_eq!(names, expected);
    // Primary documents never carry a stamped version
    assert_eq!(ledger.get_current("p1").unwrap().unwrap().source.version(), None);
}
