//! Typed entities end to end through the facade.

use crate::common::*;
use esorm::{Criterion, Entities, Error, FieldValue};

#[test]
fn entity_lifecycle() {
    let ts = TestSession::new();
    let people = Entities::new(&ts.session, person_schema());

    let mut p = people
        .create([("uid", text("p1")), ("name", text("A")), ("age", FieldValue::from(30))])
        .unwrap();
    assert!(people.save(&p).unwrap());
    assert!(!people.save(&p).unwrap());

    p.set("age", 31).unwrap();
    assert!(people.save(&p).unwrap());
    assert_eq!(people.get_all_versions(&p).unwrap(), vec![1, 2]);

    let young = people.load_version(&p, 1).unwrap().unwrap();
    assert_eq!(young.get("age").unwrap(), Some(&FieldValue::Int(30)));

    let found = people.find([("age", Criterion::equals(31))]).unwrap();
    assert_eq!(found, vec![p.clone()]);

    people.delete(&p).unwrap();
    assert!(people.find_by("age", 31).unwrap().is_empty());
    assert!(people.get("p1").unwrap().is_none());

    people.delete_version(&p, 1).unwrap();
    assert_eq!(people.get_all_versions(&p).unwrap(), vec![2]);
}

#[test]
fn entity_documents_share_the_ledger_layout() {
    let ts = TestSession::new();
    let people = Entities::new(&ts.session, person_schema());
    let p = people.create([("uid", text("p1")), ("name", text("A"))]).unwrap();
    people.save(&p).unwrap();

    // The ledger sees the same document an untyped caller would write
    let outcome = ts.session.ledger().insert(&named("p1", "A")).unwrap();
    assert!(!outcome.was_written());

    let current = ts.session.ledger().get_current("p1").unwrap().unwrap();
    assert_eq!(current.source.meta.class_name, "Person");
    assert!(!current.source.is_deleted());
}

#[test]
fn unknown_field_is_rejected_before_any_write() {
    let ts = TestSession::new();
    let people = Entities::new(&ts.session, person_schema());
    let err = people.create([("email", text("a@b"))]).unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. }));
    assert_eq!(ts.primary_count(), 0);
}
