//! In-memory selector evaluation.
//!
//! [`UnindexedMatcher`] completes queries no index answers exactly. It
//! follows the comparison rules the index tables get from SQLite, so a
//! document matches here exactly when the equivalent SQL would select it:
//!
//! - `null`, objects and nested arrays never compare to anything
//! - numbers compare by value, integers and floats mixed; booleans are the
//!   numbers `1` and `0`
//! - strings compare byte-wise
//! - every number orders before every string
//! - an array-valued field matches when any element does
//!
//! `$text` clauses cannot be evaluated in memory. They are skipped: under
//! `$and` a skipped clause does not constrain, under `$or` it contributes
//! nothing.

use crate::selector::{Clause, Compound, Operator, Predicate, Scalar, Selector};
use crate::value::extract;
use quarry_store::DocumentRevision;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Evaluates a canonical selector against documents.
#[derive(Debug, Clone)]
pub struct UnindexedMatcher {
    selector: Selector,
}

impl UnindexedMatcher {
    /// Creates a matcher for a normalized selector.
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self { selector }
    }

    /// Returns true if the revision's body, with `_id` and `_rev`, matches.
    #[must_use]
    pub fn matches(&self, rev: &DocumentRevision) -> bool {
        match rev.to_json() {
            Value::Object(doc) => self.matches_body(&doc),
            _ => false,
        }
    }

    /// Returns true if a document object matches.
    #[must_use]
    pub fn matches_body(&self, doc: &Map<String, Value>) -> bool {
        selector_matches(&self.selector, doc)
    }
}

fn selector_matches(selector: &Selector, doc: &Map<String, Value>) -> bool {
    let mut results = selector
        .clauses
        .iter()
        .filter_map(|clause| clause_matches(clause, doc));
    match selector.op {
        Compound::And => results.all(|matched| matched),
        Compound::Or => results.any(|matched| matched),
    }
}

fn clause_matches(clause: &Clause, doc: &Map<String, Value>) -> Option<bool> {
    match clause {
        Clause::Field { field, predicate } => {
            let actual = extract(doc, field);
            Some(match predicate {
                Predicate::Op(op) => operator_matches(op, actual),
                Predicate::Not(op) => !operator_matches(op, actual),
            })
        }
        Clause::Compound(inner) => Some(selector_matches(inner, doc)),
        Clause::Text { .. } => None,
    }
}

fn operator_matches(op: &Operator, actual: Option<&Value>) -> bool {
    match op {
        Operator::Exists(expected) => actual.is_some() == *expected,
        Operator::Size(n) => matches!(actual, Some(Value::Array(items)) if items.len() as u64 == *n),
        Operator::Mod { divisor, remainder } => candidates(actual)
            .iter()
            .any(|v| modulo_matches(v, *divisor, *remainder)),
        Operator::In(expected) => candidates(actual)
            .iter()
            .any(|v| expected.iter().any(|e| compare(v, e) == Some(Ordering::Equal))),
        Operator::Eq(e) => any_ordering(actual, e, |o| o == Ordering::Equal),
        Operator::Gt(e) => any_ordering(actual, e, |o| o == Ordering::Greater),
        Operator::Gte(e) => any_ordering(actual, e, |o| o != Ordering::Less),
        Operator::Lt(e) => any_ordering(actual, e, |o| o == Ordering::Less),
        Operator::Lte(e) => any_ordering(actual, e, |o| o != Ordering::Greater),
    }
}

/// The values a field contributes: its elements if it is an array.
fn candidates(actual: Option<&Value>) -> &[Value] {
    match actual {
        None => &[],
        Some(Value::Array(items)) => items,
        Some(value) => std::slice::from_ref(value),
    }
}

fn any_ordering(actual: Option<&Value>, expected: &Scalar, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates(actual)
        .iter()
        .any(|v| compare(v, expected).is_some_and(&accept))
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

enum Comparable<'a> {
    Number(Number),
    Text(&'a str),
}

fn comparable(value: &Value) -> Option<Comparable<'_>> {
    match value {
        Value::String(s) => Some(Comparable::Text(s)),
        Value::Bool(b) => Some(Comparable::Number(Number::Integer(i64::from(*b)))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Comparable::Number(Number::Integer(i))),
            None => n.as_f64().map(|f| Comparable::Number(Number::Float(f))),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn scalar_comparable(value: &Scalar) -> Comparable<'_> {
    match value {
        Scalar::String(s) => Comparable::Text(s),
        Scalar::Integer(i) => Comparable::Number(Number::Integer(*i)),
        Scalar::Float(f) => Comparable::Number(Number::Float(*f)),
        Scalar::Bool(b) => Comparable::Number(Number::Integer(i64::from(*b))),
    }
}

/// Orders a document value against an operand; `None` when they never
/// compare.
fn compare(actual: &Value, expected: &Scalar) -> Option<Ordering> {
    match (comparable(actual)?, scalar_comparable(expected)) {
        (Comparable::Number(a), Comparable::Number(b)) => a.compare(b),
        (Comparable::Text(a), Comparable::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (Comparable::Number(_), Comparable::Text(_)) => Some(Ordering::Less),
        (Comparable::Text(_), Comparable::Number(_)) => Some(Ordering::Greater),
    }
}

/// Only numbers (and booleans) have a remainder; strings never match, even
/// numeric ones like `"31"`. The SQL translation restricts `%` to integer
/// and real columns for the same result.
fn modulo_matches(value: &Value, divisor: i64, remainder: i64) -> bool {
    let dividend = match comparable(value) {
        Some(Comparable::Number(Number::Integer(i))) => i,
        // Saturating cast truncates toward zero.
        Some(Comparable::Number(Number::Float(f))) => f as i64,
        _ => return false,
    };
    dividend.checked_rem(divisor) == Some(remainder)
}
