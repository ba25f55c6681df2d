//! Property-based tests for paramfile-core.
//!
//! These tests use proptest to check evaluation and guard invariants across
//! many randomly generated inputs.

use proptest::prelude::*;

use crate::{Exception, Expectation, ExpectationGuard, Namespace, Value};

/// Strategy for generating snippet identifiers.
fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}".prop_filter("keywords are not identifiers", |name| {
        !matches!(
            name.as_str(),
            "and" | "or" | "not" | "in" | "if" | "else" | "assert" | "pass" | "true" | "false" | "null"
        )
    })
}

/// Strategy for generating message fragments.
fn fragment_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,.:-]{0,20}"
}

proptest! {
    #[test]
    fn arithmetic_matches_rust(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        let ns = Namespace::from_bindings([("a", a), ("b", b)]);
        prop_assert_eq!(ns.eval("a + b").unwrap(), Value::Int(a + b));
        prop_assert_eq!(ns.eval("a - b").unwrap(), Value::Int(a - b));
        prop_assert_eq!(ns.eval("a * b").unwrap(), Value::Int(a * b));
    }

    #[test]
    fn floor_division_identity(a in -10_000i64..10_000, b in -100i64..100) {
        prop_assume!(b != 0);
        let ns = Namespace::from_bindings([("a", a), ("b", b)]);
        prop_assert_eq!(ns.eval("(a // b) * b + a % b == a").unwrap(), Value::Bool(true));
        // The remainder always takes the sign of the divisor.
        let remainder = ns.eval("a % b").unwrap().as_i64().unwrap();
        prop_assert!(remainder == 0 || (remainder < 0) == (b < 0));
    }

    #[test]
    fn string_repr_evaluates_back(s in "[a-zA-Z0-9 '\"\\\\]{0,30}") {
        let ns = Namespace::new();
        let value = Value::from(s.as_str());
        prop_assert_eq!(ns.eval(value.repr()).unwrap(), value);
    }

    #[test]
    fn exec_never_mutates_the_original(name in identifier_strategy(), n in any::<i32>()) {
        let ns = Namespace::from_bindings([("seed", 1)]);
        let derived = ns.exec(&format!("{name} = {n}")).unwrap();
        prop_assert_eq!(derived.get(&name), Some(&Value::from(n)));
        prop_assert_eq!(ns.len(), 1);
        prop_assert_eq!(ns.get("seed"), Some(&Value::Int(1)));
    }

    #[test]
    fn message_substrings_are_found(
        prefix in fragment_strategy(),
        needle in fragment_strategy(),
        suffix in fragment_strategy(),
    ) {
        let guard = ExpectationGuard::from(Expectation::new("ValueError").message(needle.clone()));
        let message = format!("{prefix}{needle}{suffix}");
        for _ in 0..2 {
            let outcome = guard.check(|| Err::<(), _>(Exception::value_error(message.clone())));
            prop_assert!(matches!(outcome, Ok(None)));
        }
    }

    #[test]
    fn inactive_guard_passes_values_through(n in any::<i64>()) {
        let guard = ExpectationGuard::NoExpectation;
        let outcome = guard.check(|| Ok::<_, Exception>(n)).unwrap();
        prop_assert_eq!(outcome, Some(n));
    }
}
