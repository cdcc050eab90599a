//! Ledger invariants over generated and fixture-driven inputs.

use crate::common::*;
use esorm::{DocumentStore, Error, WriteMode};
use proptest::prelude::*;
use serde_json::json;

mod idempotent_insert {
    use super::*;

    #[test]
    fn second_identical_insert_writes_nothing() {
        let ts = TestSession::new();
        let doc = person(json!({"uid": "p1", "name": "A", "age": 3}));

        assert!(ts.session.ledger().insert(&doc).unwrap().was_written());
        let before = ts.session.ledger().get_all_versions("p1").unwrap();
        assert!(!ts.session.ledger().insert(&doc).unwrap().was_written());
        assert_eq!(ts.session.ledger().get_all_versions("p1").unwrap(), before);
    }

    #[test]
    fn key_order_does_not_matter() {
        let ts = TestSession::new();
        ts.session
            .ledger()
            .insert(&person(json!({"uid": "p1", "a": 1, "b": 2})))
            .unwrap();
        let outcome = ts
            .session
            .ledger()
            .insert(&person(json!({"b": 2, "a": 1, "uid": "p1"})))
            .unwrap();
        assert!(!outcome.was_written());
    }
}

mod monotonic_versions {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn n_distinct_inserts_give_n_increasing_versions(n in 1usize..25) {
            let ts = TestSession::new();
            for i in 0..n {
                ts.session.ledger().insert(&person(json!({"uid": "p1", "i": i}))).unwrap();
            }
            let versions = ts.session.ledger().get_all_versions("p1").unwrap();
            prop_assert_eq!(versions.len(), n);
            prop_assert!(versions.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(versions.last().copied(), Some(n as u64));
        }
    }

    #[test]
    fn uids_have_independent_sequences() {
        let ts = TestSession::new();
        for name in ["A", "B", "C"] {
            ts.session.ledger().insert(&named("p1", name)).unwrap();
        }
        ts.session.ledger().insert(&named("p2", "A")).unwrap();
        assert_eq!(ts.session.ledger().get_all_versions("p2").unwrap(), vec![1]);
    }
}

mod tombstones {
    use super::*;

    #[test]
    fn delete_keeps_everything_retrievable() {
        let ts = TestSession::new();
        let ledger = ts.session.ledger();
        ledger.insert(&named("p1", "A")).unwrap();
        ledger.insert(&named("p1", "B")).unwrap();

        ledger.delete("p1").unwrap();
        assert_eq!(ts.primary_count(), 1);
        assert_eq!(ts.version_count(), 2);
        assert!(ledger.history("p1").unwrap().iter().all(|h| h.source.is_deleted()));
    }

    #[test]
    fn delete_of_absent_uid_is_caller_error() {
        let ts = TestSession::new();
        let err = ts.session.ledger().delete("nobody").unwrap_err();
        assert!(err.is_caller_error());
    }
}

mod physical_version_delete {
    use super::*;

    #[test]
    fn erases_exactly_one_version() {
        let ts = TestSession::new();
        let ledger = ts.session.ledger();
        for name in ["A", "B", "C"] {
            ledger.insert(&named("p1", name)).unwrap();
        }

        let res = ledger.delete_version("p1", 2).unwrap();
        assert_eq!(res.deleted, 1);
        assert!(ledger.get_doc_by_version("p1", 2).unwrap().is_none());
        assert_eq!(ledger.get_all_versions("p1").unwrap(), vec![1, 3]);
    }

    #[test]
    fn erasing_missing_version_deletes_nothing() {
        let ts = TestSession::new();
        ts.session.ledger().insert(&named("p1", "A")).unwrap();
        let res = ts.session.ledger().delete_version("p1", 9).unwrap();
        assert_eq!(res.deleted, 0);
        assert_eq!(ts.version_count(), 1);
    }
}

mod uniqueness_fault {
    use super::*;

    #[test]
    fn two_records_for_one_version_raise() {
        let ts = TestSession::new();
        ts.session.ledger().insert(&named("p1", "A")).unwrap();
        ts.store
            .index("version", &named("p1", "A").stamped(1), &WriteMode::Auto)
            .unwrap();

        let err = ts.session.ledger().get_doc_by_version("p1", 1).unwrap_err();
        assert!(matches!(err, Error::DuplicateVersion { ref uid, version: 1, count: 2 } if uid == "p1"));
        assert!(!err.is_caller_error());
    }
}
