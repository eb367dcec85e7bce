// jsonagg-core/src/condition.rs
//! `$match` condition evaluation
//!
//! A condition pairs a field path with an operator object:
//!
//! ```text
//! { age: { $gt: 25, $lte: 40 } }
//! ```
//!
//! The resolved field's JSON kind decides which operators apply:
//!
//! | field kind          | operators                         | operand        |
//! |---------------------|-----------------------------------|----------------|
//! | string holding date | `$gt` `$gte` `$lt` `$lte`         | date string    |
//! | other string        | `$eq` `$ne`                       | string         |
//! | number              | all six                           | number (f64)   |
//! | boolean             | `$eq` `$ne`                       | boolean        |
//! | null/object/array   | none                              |                |
//!
//! Operators that do not apply to the field's kind are skipped. An operand of
//! the wrong kind fails the condition.

use crate::date_literal::parse_datetime;
use crate::log_debug;
use crate::path::FieldPath;
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operator usable in a `$match` operator object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn from_key(key: &str) -> Option<Operator> {
        match key {
            "$eq" => Some(Operator::Eq),
            "$ne" => Some(Operator::Ne),
            "$gt" => Some(Operator::Gt),
            "$gte" => Some(Operator::Gte),
            "$lt" => Some(Operator::Lt),
            "$lte" => Some(Operator::Lte),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }

    /// Does `field cmp operand == ordering` satisfy this operator?
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Gte => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
        }
    }
}

/// One `field: { operators }` entry of a `$match` clause
#[derive(Debug, Clone)]
pub struct Condition {
    path: FieldPath,
    operators: Vec<(Operator, Value)>,
}

impl Condition {
    /// Build from a field path and its operator object.
    ///
    /// A non-object value is shorthand for `$eq` (`{ name: "Alice" }`).
    /// Unknown `$` operators are ignored.
    pub fn from_json(field: &str, spec: &Value) -> Self {
        let operators = match spec {
            Value::Object(ops) => ops
                .iter()
                .filter_map(|(key, operand)| match Operator::from_key(key) {
                    Some(op) => Some((op, operand.clone())),
                    None => {
                        log_debug!("Ignoring unsupported operator '{}' on '{}'", key, field);
                        None
                    }
                })
                .collect(),
            other => vec![(Operator::Eq, other.clone())],
        };

        Condition {
            path: FieldPath::parse(field),
            operators,
        }
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// A document matches when the path resolves and every applicable operator holds
    pub fn matches(&self, doc: &Value) -> bool {
        match self.path.resolve(doc) {
            Some(value) => evaluate(value, &self.operators),
            None => false,
        }
    }
}

/// Evaluate operators against a resolved field value
pub fn evaluate(value: &Value, operators: &[(Operator, Value)]) -> bool {
    match value {
        Value::String(text) => match parse_datetime(text) {
            Some(date) => operators
                .iter()
                .filter(|(op, _)| !op.is_equality())
                .all(|(op, operand)| {
                    operand
                        .as_str()
                        .and_then(parse_datetime)
                        .is_some_and(|rhs| op.accepts(date.cmp(&rhs)))
                }),
            None => operators
                .iter()
                .filter(|(op, _)| op.is_equality())
                .all(|(op, operand)| {
                    operand
                        .as_str()
                        .is_some_and(|rhs| op.accepts(text.as_str().cmp(rhs)))
                }),
        },
        Value::Number(number) => {
            let Some(lhs) = number.as_f64() else {
                return false;
            };
            operators.iter().all(|(op, operand)| {
                operand
                    .as_f64()
                    .and_then(|rhs| lhs.partial_cmp(&rhs))
                    .is_some_and(|ordering| op.accepts(ordering))
            })
        }
        Value::Bool(flag) => operators
            .iter()
            .filter(|(op, _)| op.is_equality())
            .all(|(op, operand)| {
                operand
                    .as_bool()
                    .is_some_and(|rhs| op.accepts(flag.cmp(&rhs)))
            }),
        Value::Null | Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, spec: Value) -> Condition {
        Condition::from_json(field, &spec)
    }

    #[test]
    fn test_operator_keys_round_trip() {
        for op in [Operator::Eq, Operator::Ne, Operator::Gt, Operator::Gte, Operator::Lt, Operator::Lte] {
            assert_eq!(Operator::from_key(op.key()), Some(op));
        }
        assert_eq!(Operator::from_key("$in"), None);
    }

    #[test]
    fn test_numeric_operators() {
        let doc = json!({"age": 30});
        assert!(cond("age", json!({"$gt": 25})).matches(&doc));
        assert!(!cond("age", json!({"$gt": 30})).matches(&doc));
        assert!(cond("age", json!({"$gte": 30})).matches(&doc));
        assert!(cond("age", json!({"$lt": 31.5})).matches(&doc));
        assert!(!cond("age", json!({"$lte": 29})).matches(&doc));
        assert!(cond("age", json!({"$eq": 30.0})).matches(&doc));
        assert!(cond("age", json!({"$ne": 31})).matches(&doc));
    }

    #[test]
    fn test_every_operator_must_hold() {
        let doc = json!({"age": 30});
        assert!(cond("age", json!({"$gt": 25, "$lt": 35})).matches(&doc));
        assert!(!cond("age", json!({"$gt": 25, "$lt": 30})).matches(&doc));
        assert!(!cond("age", json!({"$lt": 35, "$gt": 30})).matches(&doc));
    }

    #[test]
    fn test_string_equality() {
        let doc = json!({"name": "Alice"});
        assert!(cond("name", json!({"$eq": "Alice"})).matches(&doc));
        assert!(!cond("name", json!({"$eq": "alice"})).matches(&doc));
        assert!(cond("name", json!({"$ne": "Bob"})).matches(&doc));
        assert!(!cond("name", json!({"$ne": "Alice"})).matches(&doc));
        // Ordering operators do not apply to plain text
        assert!(cond("name", json!({"$gt": "Zed"})).matches(&doc));
    }

    #[test]
    fn test_date_strings() {
        let doc = json!({"CreatedAt": "2024-04-18T12:34:56Z"});
        assert!(cond("CreatedAt", json!({"$gte": "2024-04-16T00:00:00Z"})).matches(&doc));
        assert!(!cond("CreatedAt", json!({"$lt": "2024-04-16T00:00:00Z"})).matches(&doc));
        assert!(cond("CreatedAt", json!({"$lte": "2024-04-18T12:34:56.000Z"})).matches(&doc));
        assert!(!cond("CreatedAt", json!({"$gt": "2024-04-18T12:34:56Z"})).matches(&doc));
        assert!(cond(
            "CreatedAt",
            json!({"$gte": "2024-01-01T00:00:00Z", "$lt": "2025-01-01T00:00:00Z"})
        )
        .matches(&doc));
        assert!(!cond(
            "CreatedAt",
            json!({"$gte": "2024-01-01T00:00:00Z", "$lt": "2024-02-01T00:00:00Z"})
        )
        .matches(&doc));
    }

    #[test]
    fn test_date_strings_skip_equality_operators() {
        let doc = json!({"CreatedAt": "2024-04-18T12:34:56Z"});
        assert!(cond("CreatedAt", json!({"$eq": "something else"})).matches(&doc));
    }

    #[test]
    fn test_boolean_operators() {
        let doc = json!({"active": true});
        assert!(cond("active", json!({"$eq": true})).matches(&doc));
        assert!(!cond("active", json!({"$ne": true})).matches(&doc));
        assert!(cond("active", json!({"$gt": false})).matches(&doc));
    }

    #[test]
    fn test_mismatched_operands_fail() {
        assert!(!cond("age", json!({"$gt": "thirty"})).matches(&json!({"age": 30})));
        assert!(!cond("name", json!({"$eq": 5})).matches(&json!({"name": "Alice"})));
        assert!(!cond("active", json!({"$eq": "true"})).matches(&json!({"active": true})));
        assert!(!cond("at", json!({"$gte": "not a date"}))
            .matches(&json!({"at": "2024-04-18T12:34:56Z"})));
    }

    #[test]
    fn test_non_scalar_fields_have_no_applicable_operators() {
        assert!(cond("tags", json!({"$eq": 1})).matches(&json!({"tags": [1, 2]})));
        assert!(cond("meta", json!({"$gt": 1})).matches(&json!({"meta": {"a": 1}})));
        assert!(cond("note", json!({"$eq": "x"})).matches(&json!({"note": null})));
    }

    #[test]
    fn test_missing_field_never_matches() {
        assert!(!cond("age", json!({"$ne": 1})).matches(&json!({"name": "Alice"})));
        assert!(!cond("age", json!({})).matches(&json!({})));
    }

    #[test]
    fn test_nested_case_insensitive_path() {
        let doc = json!({"Contacts": {"Email": "alice@example.com"}});
        assert!(cond("contacts.email", json!({"$eq": "alice@example.com"})).matches(&doc));
        assert_eq!(cond("contacts.email", json!({})).path().segments().len(), 2);
    }

    #[test]
    fn test_implicit_eq_and_unknown_operators() {
        let doc = json!({"name": "Alice", "age": 30});
        assert!(cond("name", json!("Alice")).matches(&doc));
        assert!(!cond("name", json!("Bob")).matches(&doc));
        assert!(cond("age", json!(30)).matches(&doc));
        assert!(cond("age", json!({"$in": [1, 2]})).matches(&doc));
    }
}
