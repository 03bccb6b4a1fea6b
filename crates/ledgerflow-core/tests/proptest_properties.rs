// crates/ledgerflow-core/tests/proptest_properties.rs
// ============================================================================
// Module: Property-Based Tests
// Description: Properties of value rounding and condition operators.
// Purpose: Detect panics and invariant drift across wide input ranges.
// ============================================================================

//! Property-based tests for calculation and predicate invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::str::FromStr;

use bigdecimal::BigDecimal;
use ledgerflow_core::Operator;
use ledgerflow_core::Predicate;
use ledgerflow_core::calculate_value;
use proptest::prelude::*;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Strategies
// ============================================================================

fn cents(raw: u64) -> BigDecimal {
    BigDecimal::from_str(&format!("{}.{:02}", raw / 100, raw % 100)).unwrap()
}

fn fraction(raw: u32) -> BigDecimal {
    BigDecimal::from_str(&format!("{}.{:04}", raw / 10_000, raw % 10_000)).unwrap()
}

const OPERATORS: [Operator; 12] = [
    Operator::Eq,
    Operator::Ne,
    Operator::Lt,
    Operator::Le,
    Operator::Gt,
    Operator::Ge,
    Operator::In,
    Operator::NotIn,
    Operator::Contains,
    Operator::StartsWith,
    Operator::EndsWith,
    Operator::Exists,
];

fn json_value_strategy(max_depth: u32) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|v| Value::Number(v.into())),
        "[a-z0-9.]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(max_depth, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

// ============================================================================
// SECTION: Rounding
// ============================================================================

proptest! {
    #[test]
    fn calculated_values_keep_two_places_within_half_a_cent(
        base in 0u64..100_000_000_000,
        stage in 0u32..=10_000,
        milestone in 0u32..=10_000,
        event in 0u32..=10_000,
    ) {
        let (base, stage, milestone, event) =
            (cents(base), fraction(stage), fraction(milestone), fraction(event));
        let value = calculate_value(&base, &stage, &milestone, &event);
        let raw = &base * &stage * &milestone * &event;
        prop_assert_eq!(value.as_bigint_and_exponent().1, 2);
        prop_assert!((&value - &raw).abs() <= BigDecimal::from_str("0.005").unwrap());
    }

    #[test]
    fn calculated_values_are_monotone_in_the_base(
        base in 0u64..1_000_000_000,
        delta in 0u64..1_000_000,
        stage in 0u32..=10_000,
        event in 0u32..=10_000,
    ) {
        let (stage, event, full) = (fraction(stage), fraction(event), fraction(10_000));
        let lower = calculate_value(&cents(base), &stage, &full, &event);
        let upper = calculate_value(&cents(base + delta), &stage, &full, &event);
        prop_assert!(lower <= upper);
    }
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

proptest! {
    #[test]
    fn numeric_ordering_matches_integers(a in any::<i32>(), b in any::<i32>()) {
        let context = json!({"amount": a});
        prop_assert_eq!(Predicate::leaf("amount", Operator::Lt, json!(b)).evaluate(&context), a < b);
        prop_assert_eq!(Predicate::leaf("amount", Operator::Ge, json!(b)).evaluate(&context), a >= b);
        prop_assert_eq!(Predicate::leaf("amount", Operator::Eq, json!(b)).evaluate(&context), a == b);
        prop_assert_eq!(Predicate::leaf("amount", Operator::Ne, json!(b)).evaluate(&context), a != b);
    }

    #[test]
    fn numeric_strings_equal_their_numbers(a in any::<i32>()) {
        let context = json!({"amount": a.to_string()});
        prop_assert!(Predicate::leaf("amount", Operator::Eq, json!(a)).evaluate(&context));
    }

    #[test]
    fn negation_inverts_every_leaf(
        op_index in 0usize..OPERATORS.len(),
        operand in json_value_strategy(2),
        context in json_value_strategy(3),
    ) {
        let leaf = Predicate::leaf("a.b", OPERATORS[op_index], operand);
        let negated = Predicate::Not(Box::new(leaf.clone()));
        prop_assert_eq!(negated.evaluate(&context), !leaf.evaluate(&context));
    }

    #[test]
    fn parsed_predicates_evaluate_like_built_ones(
        op_index in 0usize..OPERATORS.len(),
        operand in json_value_strategy(1),
        context in json_value_strategy(3),
    ) {
        let built = Predicate::leaf("a", OPERATORS[op_index], operand);
        if let Ok(parsed) = Predicate::parse(&built.to_json()) {
            prop_assert_eq!(parsed.evaluate(&context), built.evaluate(&context));
        }
    }
}
