//! Property-based tests for paramfile.
//!
//! These tests use proptest to check pairing, case metadata and schema
//! invariants across many randomly generated inputs.

use proptest::prelude::*;

use paramfile_core::Value;

use crate::discovery::{zip_broadcast, OneOrMany};
use crate::error::ConfigErrorKind;
use crate::resolve::{case_id, case_marks};
use crate::schema::{defaults, CaseParams, SchemaStage};

/// Strategy for generating mark names.
fn mark_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,10}"
}

proptest! {
    #[test]
    fn broadcast_one_over_many(one in 0u8..255, many in prop::collection::vec(any::<u16>(), 0..20)) {
        let pairs = zip_broadcast(&OneOrMany::One(one), &OneOrMany::Many(many.clone())).unwrap();
        prop_assert_eq!(pairs.len(), many.len());
        prop_assert!(pairs.iter().all(|(a, _)| *a == one));

        let flipped = zip_broadcast(&OneOrMany::Many(many.clone()), &OneOrMany::One(one)).unwrap();
        let rights: Vec<u16> = flipped.iter().map(|(b, _)| *b).collect();
        prop_assert_eq!(rights, many);
    }

    #[test]
    fn zip_requires_equal_lengths(
        lefts in prop::collection::vec(any::<u8>(), 0..10),
        rights in prop::collection::vec(any::<u8>(), 0..10),
    ) {
        let result = zip_broadcast(&OneOrMany::Many(lefts.clone()), &OneOrMany::Many(rights.clone()));
        if lefts.len() == rights.len() {
            prop_assert_eq!(result.unwrap().len(), lefts.len());
        } else {
            let err = result.unwrap_err();
            prop_assert_eq!(
                err.kind(),
                &ConfigErrorKind::MismatchedCounts { paths: lefts.len(), keys: rights.len() }
            );
        }
    }

    #[test]
    fn marks_string_and_list_agree(names in prop::collection::vec(mark_strategy(), 0..6)) {
        let joined = Value::from(names.join(" , "));
        let list = Value::List(names.iter().map(|n| Value::from(n.as_str())).collect());

        let from_string = case_marks(Some(&joined)).unwrap();
        let from_list = case_marks(Some(&list)).unwrap();
        prop_assert_eq!(&from_string, &from_list);

        let parsed: Vec<&str> = from_string.iter().map(|m| m.name()).collect();
        prop_assert_eq!(parsed, names.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn missing_id_is_position(position in 1usize..10_000) {
        prop_assert_eq!(case_id(None, position).unwrap(), position.to_string());
        prop_assert_eq!(case_id(Some(&Value::None), position).unwrap(), position.to_string());
        prop_assert_eq!(case_id(Some(&Value::Int(7)), position).unwrap(), "7");
    }

    #[test]
    fn defaults_never_override(given in any::<i64>(), fallback in any::<i64>()) {
        let stage = defaults().value("x", fallback).value("y", fallback);
        let mut case = CaseParams::new();
        case.insert("x".to_string(), Value::Int(given));

        let out = stage.apply(case).unwrap();
        prop_assert_eq!(&out["x"], &Value::Int(given));
        prop_assert_eq!(&out["y"], &Value::Int(fallback));
    }
}
