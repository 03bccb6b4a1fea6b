// crates/ledgerflow-core/src/core/condition.rs
// ============================================================================
// Module: Ledgerflow Condition DSL
// Description: Declarative JSON predicates and branch routing for condition nodes.
// Purpose: Evaluate template predicates over dotted paths without scripting.
// Dependencies: bigdecimal, serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! A predicate is a JSON tree: leaves are `{field, op, value}` and inner nodes
//! are `{all: [...]}`, `{any: [...]}`, or `{not: ...}`. Fields are dotted paths
//! walked through a plain JSON context; unknown fields never fail evaluation,
//! they simply make the leaf false (`exists` reports them as absent).
//!
//! Numeric comparisons are decimal-aware: numbers and numeric strings are
//! parsed into `BigDecimal` so `"1000.00" == 1000` holds. String ordering
//! prefers RFC3339 date-time or date comparison and falls back to lexical order.
//!
//! [`ConditionRouting`] wraps predicates into an ordered rule list mapping the
//! first matching rule to a named branch, then to a node sequence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum nesting depth accepted when parsing a predicate.
pub const MAX_PREDICATE_DEPTH: usize = 32;

/// Route name used when no rule matches.
pub const DEFAULT_ROUTE: &str = "default";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Predicate parse and shape errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// Predicate node was not a JSON object.
    #[error("predicate at {path} must be an object")]
    NotAnObject {
        /// JSON path of the offending node.
        path: String,
    },
    /// Predicate node mixed or omitted its discriminating keys.
    #[error("predicate at {path} must have exactly one of all, any, not, or field")]
    AmbiguousNode {
        /// JSON path of the offending node.
        path: String,
    },
    /// Operator string is not part of the DSL.
    #[error("unknown operator {op} at {path}")]
    UnknownOperator {
        /// JSON path of the offending node.
        path: String,
        /// Operator text.
        op: String,
    },
    /// Leaf is missing its field or value.
    #[error("predicate leaf at {path} is missing {missing}")]
    MissingKey {
        /// JSON path of the offending node.
        path: String,
        /// Missing key name.
        missing: &'static str,
    },
    /// Leaf value does not fit the operator.
    #[error("operator {op} at {path} requires {expected}")]
    InvalidOperand {
        /// JSON path of the offending node.
        path: String,
        /// Operator text.
        op: &'static str,
        /// Expected operand shape.
        expected: &'static str,
    },
    /// `all`/`any` list was empty.
    #[error("predicate group at {path} must not be empty")]
    EmptyGroup {
        /// JSON path of the offending node.
        path: String,
    },
    /// Tree exceeded the maximum depth.
    #[error("predicate nesting exceeds {MAX_PREDICATE_DEPTH} levels")]
    TooDeep,
    /// Routing rule referenced a branch with no route.
    #[error("branch {0} has no route")]
    UnroutedBranch(String),
    /// Routing declared no rules and no default.
    #[error("condition routing must declare at least one rule or a default route")]
    EmptyRouting,
}

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Leaf comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Strictly less.
    Lt,
    /// Less or equal.
    Le,
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Ge,
    /// Membership in a list.
    In,
    /// Non-membership in a list.
    NotIn,
    /// Substring or element containment.
    Contains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Field presence.
    Exists,
}

impl Operator {
    /// Returns the DSL spelling of the operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Exists => "exists",
        }
    }

    /// Parses a DSL operator spelling.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let op = match label {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "contains" => Self::Contains,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "exists" => Self::Exists,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Predicate Tree
// ============================================================================

/// Parsed predicate tree.
///
/// # Invariants
/// - Groups are non-empty and depth is bounded by [`MAX_PREDICATE_DEPTH`].
/// - `in`/`not_in` leaves carry an array operand; `exists` leaves a boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Predicate {
    /// Every child holds.
    All(Vec<Self>),
    /// At least one child holds.
    Any(Vec<Self>),
    /// Child does not hold.
    Not(Box<Self>),
    /// Field comparison.
    Leaf {
        /// Dotted field path.
        field: String,
        /// Comparison operator.
        op: Operator,
        /// Operand value.
        value: Value,
    },
}

impl Predicate {
    /// Builds a leaf predicate.
    #[must_use]
    pub fn leaf(field: impl Into<String>, op: Operator, value: Value) -> Self {
        Self::Leaf {
            field: field.into(),
            op,
            value,
        }
    }

    /// Parses a predicate from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError`] when the JSON does not follow the DSL shape.
    pub fn parse(json: &Value) -> Result<Self, ConditionError> {
        parse_node(json, "$", 0)
    }

    /// Evaluates the predicate against a JSON context.
    #[must_use]
    pub fn evaluate(&self, context: &Value) -> bool {
        match self {
            Self::All(children) => children.iter().all(|child| child.evaluate(context)),
            Self::Any(children) => children.iter().any(|child| child.evaluate(context)),
            Self::Not(child) => !child.evaluate(context),
            Self::Leaf {
                field,
                op,
                value,
            } => evaluate_leaf(lookup_path(context, field), *op, value),
        }
    }

    /// Renders the predicate back to its JSON form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::All(children) => {
                single_key("all", Value::Array(children.iter().map(Self::to_json).collect()))
            }
            Self::Any(children) => {
                single_key("any", Value::Array(children.iter().map(Self::to_json).collect()))
            }
            Self::Not(child) => single_key("not", child.to_json()),
            Self::Leaf {
                field,
                op,
                value,
            } => {
                let mut map = Map::new();
                map.insert("field".to_string(), Value::String(field.clone()));
                map.insert("op".to_string(), Value::String(op.as_str().to_string()));
                map.insert("value".to_string(), value.clone());
                Value::Object(map)
            }
        }
    }
}

impl TryFrom<Value> for Predicate {
    type Error = ConditionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Predicate> for Value {
    fn from(predicate: Predicate) -> Self {
        predicate.to_json()
    }
}

/// Builds a single-key JSON object.
fn single_key(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Parses one predicate node.
fn parse_node(json: &Value, path: &str, depth: usize) -> Result<Predicate, ConditionError> {
    if depth >= MAX_PREDICATE_DEPTH {
        return Err(ConditionError::TooDeep);
    }
    let Value::Object(map) = json else {
        return Err(ConditionError::NotAnObject {
            path: path.to_string(),
        });
    };
    let discriminants = ["all", "any", "not", "field"]
        .iter()
        .filter(|key| map.contains_key(**key))
        .count();
    if discriminants != 1 {
        return Err(ConditionError::AmbiguousNode {
            path: path.to_string(),
        });
    }
    if let Some(children) = map.get("all") {
        return Ok(Predicate::All(parse_group(children, &format!("{path}.all"), depth)?));
    }
    if let Some(children) = map.get("any") {
        return Ok(Predicate::Any(parse_group(children, &format!("{path}.any"), depth)?));
    }
    if let Some(child) = map.get("not") {
        return Ok(Predicate::Not(Box::new(parse_node(child, &format!("{path}.not"), depth + 1)?)));
    }
    parse_leaf(map, path)
}

/// Parses an `all`/`any` child list.
fn parse_group(json: &Value, path: &str, depth: usize) -> Result<Vec<Predicate>, ConditionError> {
    let Value::Array(items) = json else {
        return Err(ConditionError::NotAnObject {
            path: path.to_string(),
        });
    };
    if items.is_empty() {
        return Err(ConditionError::EmptyGroup {
            path: path.to_string(),
        });
    }
    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_node(item, &format!("{path}[{index}]"), depth + 1))
        .collect()
}

/// Parses a `{field, op, value}` leaf.
fn parse_leaf(map: &Map<String, Value>, path: &str) -> Result<Predicate, ConditionError> {
    let field = match map.get("field") {
        Some(Value::String(field)) if !field.is_empty() => field.clone(),
        _ => {
            return Err(ConditionError::MissingKey {
                path: path.to_string(),
                missing: "field",
            });
        }
    };
    let op_label = match map.get("op") {
        Some(Value::String(op)) => op.as_str(),
        _ => {
            return Err(ConditionError::MissingKey {
                path: path.to_string(),
                missing: "op",
            });
        }
    };
    let op = Operator::from_label(op_label).ok_or_else(|| ConditionError::UnknownOperator {
        path: path.to_string(),
        op: op_label.to_string(),
    })?;
    let value = match (op, map.get("value")) {
        (Operator::Exists, None) => Value::Bool(true),
        (_, Some(value)) => value.clone(),
        (_, None) => {
            return Err(ConditionError::MissingKey {
                path: path.to_string(),
                missing: "value",
            });
        }
    };
    let operand_ok = match op {
        Operator::In | Operator::NotIn => value.is_array(),
        Operator::Exists => value.is_boolean(),
        Operator::StartsWith | Operator::EndsWith => value.is_string(),
        _ => true,
    };
    if !operand_ok {
        let expected = match op {
            Operator::In | Operator::NotIn => "an array operand",
            Operator::Exists => "a boolean operand",
            _ => "a string operand",
        };
        return Err(ConditionError::InvalidOperand {
            path: path.to_string(),
            op: op.as_str(),
            expected,
        });
    }
    Ok(Predicate::Leaf {
        field,
        op,
        value,
    })
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Resolves a dotted path; array segments are numeric indices.
#[must_use]
pub fn lookup_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Evaluates a leaf against the resolved field.
fn evaluate_leaf(actual: Option<&Value>, op: Operator, expected: &Value) -> bool {
    let present = actual.filter(|value| !value.is_null());
    if op == Operator::Exists {
        return present.is_some() == expected.as_bool().unwrap_or(true);
    }
    let Some(actual) = actual else {
        return false;
    };
    match op {
        Operator::Eq => loose_eq(actual, expected),
        Operator::Ne => !loose_eq(actual, expected),
        Operator::Lt => ordered(actual, expected).is_some_and(Ordering::is_lt),
        Operator::Le => ordered(actual, expected).is_some_and(Ordering::is_le),
        Operator::Gt => ordered(actual, expected).is_some_and(Ordering::is_gt),
        Operator::Ge => ordered(actual, expected).is_some_and(Ordering::is_ge),
        Operator::In => member_of(actual, expected),
        Operator::NotIn => expected.is_array() && !member_of(actual, expected),
        Operator::Contains => contains(actual, expected),
        Operator::StartsWith => match (actual, expected) {
            (Value::String(haystack), Value::String(prefix)) => haystack.starts_with(prefix.as_str()),
            _ => false,
        },
        Operator::EndsWith => match (actual, expected) {
            (Value::String(haystack), Value::String(suffix)) => haystack.ends_with(suffix.as_str()),
            _ => false,
        },
        Operator::Exists => false,
    }
}

/// Equality that treats numbers and numeric strings as decimals.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (decimal_of(left), decimal_of(right)) {
        (Some(left_num), Some(right_num)) if left.is_number() || right.is_number() => {
            left_num == right_num
        }
        _ => left == right,
    }
}

/// Orders two values when they are comparable.
fn ordered(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Some(left), Some(right)) = (decimal_of(left), decimal_of(right)) {
        return Some(left.cmp(&right));
    }
    match (left, right) {
        (Value::String(left), Value::String(right)) => {
            Some(temporal_cmp(left, right).unwrap_or_else(|| left.cmp(right)))
        }
        _ => None,
    }
}

/// Membership test against an array operand.
fn member_of(value: &Value, set: &Value) -> bool {
    match set {
        Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
        _ => false,
    }
}

/// Substring or element containment.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), Value::Array(needles)) => {
            needles.iter().all(|needle| items.iter().any(|item| loose_eq(item, needle)))
        }
        (Value::Array(items), needle) => items.iter().any(|item| loose_eq(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

/// Parses numbers and numeric strings into decimals.
fn decimal_of(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(number) => BigDecimal::from_str(&number.to_string()).ok(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty()
                || !trimmed.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+'))
            {
                return None;
            }
            BigDecimal::from_str(trimmed).ok()
        }
        _ => None,
    }
}

/// Compares RFC3339 date-times or plain `YYYY-MM-DD` dates.
fn temporal_cmp(left: &str, right: &str) -> Option<Ordering> {
    if let (Ok(left), Ok(right)) =
        (OffsetDateTime::parse(left, &Rfc3339), OffsetDateTime::parse(right, &Rfc3339))
    {
        return Some(left.cmp(&right));
    }
    let left = parse_calendar_date(left)?;
    let right = parse_calendar_date(right)?;
    Some(left.cmp(&right))
}

/// Parses a `YYYY-MM-DD` calendar date.
fn parse_calendar_date(value: &str) -> Option<Date> {
    let mut parts = value.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u8 = parts.next()?.parse().ok()?;
    let day: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let month = time::Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

// ============================================================================
// SECTION: Routing
// ============================================================================

/// One routing rule: when the predicate holds, take the named branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRule {
    /// Branch name, a key in [`ConditionRouting::routes`].
    pub branch: String,
    /// Predicate selecting the branch.
    pub when: Predicate,
}

/// Routing table carried by a condition node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRouting {
    /// Rules evaluated in order; the first match wins.
    #[serde(default)]
    pub rules: Vec<BranchRule>,
    /// Branch name to node sequence, optionally with a `default` entry.
    pub routes: BTreeMap<String, u32>,
}

/// Outcome of routing a condition node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Branch taken.
    pub branch: String,
    /// Sequence of the next node.
    pub sequence: u32,
}

impl ConditionRouting {
    /// Parses routing from its JSON form and checks branch coverage.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError`] when the JSON is malformed or a rule's branch
    /// has no route.
    pub fn parse(json: &Value) -> Result<Self, ConditionError> {
        let routing: Self =
            serde_json::from_value(json.clone()).map_err(|_| ConditionError::NotAnObject {
                path: "$".to_string(),
            })?;
        routing.validate()?;
        Ok(routing)
    }

    /// Checks that every rule's branch is routed.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::UnroutedBranch`] or [`ConditionError::EmptyRouting`].
    pub fn validate(&self) -> Result<(), ConditionError> {
        if self.rules.is_empty() && !self.routes.contains_key(DEFAULT_ROUTE) {
            return Err(ConditionError::EmptyRouting);
        }
        for rule in &self.rules {
            if !self.routes.contains_key(&rule.branch) {
                return Err(ConditionError::UnroutedBranch(rule.branch.clone()));
            }
        }
        Ok(())
    }

    /// Picks the route for a context, or `None` when nothing matches and no
    /// default is declared.
    #[must_use]
    pub fn route(&self, context: &Value) -> Option<RouteDecision> {
        let branch = self
            .rules
            .iter()
            .find(|rule| rule.when.evaluate(context))
            .map_or(DEFAULT_ROUTE, |rule| rule.branch.as_str());
        self.routes.get(branch).map(|sequence| RouteDecision {
            branch: branch.to_string(),
            sequence: *sequence,
        })
    }

    /// Iterates every sequence the routing can jump to.
    pub fn targets(&self) -> impl Iterator<Item = u32> + '_ {
        self.routes.values().copied()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_fields_are_absent_not_errors() {
        let predicate = Predicate::parse(&json!({"field": "contract.missing.deep", "op": "==", "value": 1}));
        assert!(predicate.is_ok());
        if let Ok(predicate) = predicate {
            assert!(!predicate.evaluate(&json!({"contract": {}})));
        }
        let exists = Predicate::leaf("contract.missing", Operator::Exists, json!(false));
        assert!(exists.evaluate(&json!({"contract": {}})));
    }

    #[test]
    fn numeric_strings_compare_as_decimals() {
        let predicate = Predicate::leaf("amount", Operator::Ge, json!(1000));
        assert!(predicate.evaluate(&json!({"amount": "1000.00"})));
        assert!(!predicate.evaluate(&json!({"amount": "999.99"})));
        assert!(Predicate::leaf("amount", Operator::Eq, json!(1.5)).evaluate(&json!({"amount": "1.50"})));
    }

    #[test]
    fn dates_order_chronologically() {
        let predicate = Predicate::leaf("signed", Operator::Lt, json!("2024-02-01"));
        assert!(predicate.evaluate(&json!({"signed": "2024-01-31"})));
        assert!(!predicate.evaluate(&json!({"signed": "2024-02-01"})));
    }

    #[test]
    fn ambiguous_nodes_are_rejected() {
        let result = Predicate::parse(&json!({"all": [], "field": "x"}));
        assert!(matches!(result, Err(ConditionError::AmbiguousNode { .. })));
        let result = Predicate::parse(&json!({"any": []}));
        assert!(matches!(result, Err(ConditionError::EmptyGroup { .. })));
        let result = Predicate::parse(&json!({"field": "x", "op": "~=", "value": 1}));
        assert!(matches!(result, Err(ConditionError::UnknownOperator { .. })));
        let result = Predicate::parse(&json!({"field": "x", "op": "in", "value": 1}));
        assert!(matches!(result, Err(ConditionError::InvalidOperand { .. })));
    }

    #[test]
    fn predicate_json_round_trips_through_serde() {
        let json = json!({"all": [
            {"field": "kind", "op": "in", "value": ["a", "b"]},
            {"not": {"field": "name", "op": "startswith", "value": "tmp"}}
        ]});
        let parsed: Result<Predicate, _> = serde_json::from_value(json.clone());
        assert!(parsed.is_ok());
        if let Ok(parsed) = parsed {
            assert_eq!(serde_json::to_value(&parsed).ok(), Some(json));
        }
    }

    #[test]
    fn routing_falls_back_to_default() {
        let routing = ConditionRouting::parse(&json!({
            "rules": [{"branch": "large", "when": {"field": "amount", "op": ">", "value": 100}}],
            "routes": {"large": 5, "default": 7}
        }));
        assert!(routing.is_ok());
        if let Ok(routing) = routing {
            assert_eq!(routing.route(&json!({"amount": 500})).map(|r| r.sequence), Some(5));
            assert_eq!(routing.route(&json!({"amount": 5})).map(|r| r.sequence), Some(7));
        }
    }

    #[test]
    fn routing_without_default_can_be_unmatched() {
        let routing = ConditionRouting::parse(&json!({
            "rules": [{"branch": "large", "when": {"field": "amount", "op": ">", "value": 100}}],
            "routes": {"large": 5}
        }));
        assert!(routing.is_ok());
        if let Ok(routing) = routing {
            assert!(routing.route(&json!({"amount": 1})).is_none());
        }
        let unrouted = ConditionRouting::parse(&json!({
            "rules": [{"branch": "x", "when": {"field": "a", "op": "exists"}}],
            "routes": {"y": 2}
        }));
        assert!(matches!(unrouted, Err(ConditionError::UnroutedBranch(_))));
    }
}
