//! Property tests for the filter grammar.

use kombu_store::{CompareOp, Filter, FilterValue, Metadata, MetadataValue, Predicate};
use proptest::prelude::*;

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

/// Scalars whose Display form stays inside the grammar (floats with two
/// decimals so no exponent notation appears).
fn scalar_strategy() -> impl Strategy<Value = MetadataValue> {
    prop_oneof![
        "[a-zA-Z0-9 _.!?-]{0,12}".prop_map(MetadataValue::Str),
        (-1_000_000i64..1_000_000).prop_map(MetadataValue::Int),
        (-100_000i64..100_000).prop_map(|n| MetadataValue::Float(n as f64 / 100.0)),
        any::<bool>().prop_map(MetadataValue::Bool),
    ]
}

fn op_strategy() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
    ]
}

fn predicate_strategy() -> impl Strategy<Value = Predicate> {
    prop_oneof![
        (key_strategy(), op_strategy(), scalar_strategy())
            .prop_map(|(key, op, value)| Predicate::new(key, op, FilterValue::Scalar(value))),
        (key_strategy(), prop::collection::vec(scalar_strategy(), 0..4))
            .prop_map(|(key, values)| Predicate::new(key, CompareOp::In, FilterValue::List(values))),
    ]
}

proptest! {
    /// Display then parse returns the same filter.
    #[test]
    fn display_parse_round_trip(predicates in prop::collection::vec(predicate_strategy(), 0..5)) {
        let filter = Filter::new(predicates);
        let rendered = filter.to_string();
        let reparsed = Filter::parse(&rendered)
            .unwrap_or_else(|e| panic!("failed to reparse {:?}: {}", rendered, e));
        prop_assert_eq!(filter, reparsed);
    }

    /// A predicate over a key the metadata does not contain never matches.
    #[test]
    fn missing_key_never_matches(predicate in predicate_strategy()) {
        let metadata = Metadata::new();
        prop_assert!(!predicate.matches(&metadata));
    }

    /// Equality against the stored value always matches, and `!=` never
    /// does, for every scalar type.
    #[test]
    fn self_equality_holds(key in key_strategy(), value in scalar_strategy()) {
        let mut metadata = Metadata::new();
        metadata.insert(key.clone(), value.clone());

        let eq = Predicate::new(key.clone(), CompareOp::Eq, FilterValue::Scalar(value.clone()));
        prop_assert!(eq.matches(&metadata));

        let ne = Predicate::new(key, CompareOp::Ne, FilterValue::Scalar(value));
        prop_assert!(!ne.matches(&metadata));
    }

    /// `in` matches exactly when the stored value appears in the list.
    /// Decoys are strings so numeric Int/Float coercion cannot produce an
    /// accidental membership.
    #[test]
    fn in_membership(
        key in key_strategy(),
        value in scalar_strategy(),
        mut others in prop::collection::vec(
            "[a-zA-Z0-9 _.!?-]{0,12}".prop_map(MetadataValue::Str),
            0..3,
        ),
        include in any::<bool>(),
    ) {
        let mut metadata = Metadata::new();
        metadata.insert(key.clone(), value.clone());

        if include {
            others.push(value.clone());
        } else {
            others.retain(|v| v != &value);
        }

        let predicate = Predicate::new(key, CompareOp::In, FilterValue::List(others));
        prop_assert_eq!(predicate.matches(&metadata), include);
    }
}
