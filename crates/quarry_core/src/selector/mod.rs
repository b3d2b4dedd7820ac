//! Canonical selector model.
//!
//! A raw Mongo-style selector (a `serde_json::Value`) is turned into a
//! [`Selector`] by [`normalize`]. The canonical form is a boolean tree whose
//! root is always `$and` or `$or`, every field clause carries an explicit
//! operator, `$ne`/`$nin` are rewritten as negations, and nested `$not`s are
//! collapsed by parity.
//!
//! ```rust
//! use quarry_core::selector::normalize;
//! use serde_json::json;
//!
//! let selector = normalize(&json!({"name": "mike"})).unwrap();
//! assert_eq!(selector.to_json(), json!({"$and": [{"name": {"$eq": "mike"}}]}));
//! ```

mod normalize;

pub use normalize::normalize;

use serde_json::{json, Map, Number, Value};
use thiserror::Error;

/// Errors produced when a raw selector cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The selector or a clause is not a JSON object.
    #[error("expected an object, found {found}")]
    NotAnObject {
        /// Rendering of the offending value.
        found: String,
    },

    /// A clause or predicate object does not have exactly one key.
    #[error("expected exactly one key in {found}")]
    NotSingleKey {
        /// Rendering of the offending object.
        found: String,
    },

    /// A compound operator was not given an array.
    #[error("argument to {operator} must be an array")]
    ExpectedArray {
        /// The compound operator.
        operator: String,
    },

    /// An operator that is not supported.
    #[error("operator {operator} is not a valid operator")]
    UnknownOperator {
        /// The unknown operator.
        operator: String,
    },

    /// An operator used where it is not allowed.
    #[error("operator {operator} cannot be used here")]
    MisplacedOperator {
        /// The misplaced operator.
        operator: String,
    },

    /// An operator was given an unusable operand.
    #[error("invalid operand for {operator}: {reason}")]
    InvalidOperand {
        /// The operator.
        operator: String,
        /// Why the operand was rejected.
        reason: String,
    },

    /// More than one `$text` clause appears in the selector.
    #[error("multiple text search clauses are not allowed in a query")]
    MultipleText,
}

/// A compound boolean operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compound {
    /// All clauses must match (`$and`).
    And,
    /// At least one clause must match (`$or`).
    Or,
}

impl Compound {
    /// Returns the selector keyword for this operator.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Compound::And => "$and",
            Compound::Or => "$or",
        }
    }
}

/// A canonical selector: a compound operator over a list of clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    /// The compound operator joining the clauses.
    pub op: Compound,
    /// The clauses.
    pub clauses: Vec<Clause>,
}

/// One clause of a compound selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// A predicate over a (possibly dotted) field.
    Field {
        /// Field path.
        field: String,
        /// Predicate applied to the field.
        predicate: Predicate,
    },
    /// A nested `$and`/`$or`.
    Compound(Selector),
    /// A full-text search.
    Text {
        /// The search expression.
        search: String,
    },
}

/// An operator, optionally negated.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The operator must hold.
    Op(Operator),
    /// The operator must not hold.
    Not(Operator),
}

impl Predicate {
    /// Returns the underlying operator.
    #[must_use]
    pub fn operator(&self) -> &Operator {
        match self {
            Predicate::Op(op) | Predicate::Not(op) => op,
        }
    }

    /// Returns true if this predicate is negated.
    #[must_use]
    pub fn is_negated(&self) -> bool {
        matches!(self, Predicate::Not(_))
    }
}

/// A field operator with its operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// `$eq`
    Eq(Scalar),
    /// `$gt`
    Gt(Scalar),
    /// `$gte`
    Gte(Scalar),
    /// `$lt`
    Lt(Scalar),
    /// `$lte`
    Lte(Scalar),
    /// `$exists`
    Exists(bool),
    /// `$in`
    In(Vec<Scalar>),
    /// `$mod`, with both operands truncated toward zero.
    Mod {
        /// Non-zero divisor.
        divisor: i64,
        /// Expected remainder.
        remainder: i64,
    },
    /// `$size`
    Size(u64),
}

impl Operator {
    /// Returns the selector keyword for this operator.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "$eq",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::Exists(_) => "$exists",
            Operator::In(_) => "$in",
            Operator::Mod { .. } => "$mod",
            Operator::Size(_) => "$size",
        }
    }

    fn operand_json(&self) -> Value {
        match self {
            Operator::Eq(v) | Operator::Gt(v) | Operator::Gte(v) | Operator::Lt(v) | Operator::Lte(v) => {
                v.to_json()
            }
            Operator::Exists(b) => Value::Bool(*b),
            Operator::In(values) => Value::Array(values.iter().map(Scalar::to_json).collect()),
            Operator::Mod { divisor, remainder } => json!([divisor, remainder]),
            Operator::Size(n) => json!(n),
        }
    }
}

/// A scalar operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A string.
    String(String),
    /// An integral number.
    Integer(i64),
    /// A finite floating point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
}

impl Scalar {
    /// Renders the scalar as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::Integer(i) => Value::Number((*i).into()),
            Scalar::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Scalar::Bool(b) => Value::Bool(*b),
        }
    }
}

impl Selector {
    /// Parses and normalizes a raw selector.
    ///
    /// # Errors
    ///
    /// Returns a [`SelectorError`] describing why the selector is invalid.
    pub fn parse(raw: &Value) -> Result<Self, SelectorError> {
        normalize(raw)
    }

    /// Renders the canonical JSON form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let clauses = self.clauses.iter().map(Clause::to_json).collect();
        let mut map = Map::new();
        map.insert(self.op.keyword().to_string(), Value::Array(clauses));
        Value::Object(map)
    }
}

impl Clause {
    fn to_json(&self) -> Value {
        match self {
            Clause::Field { field, predicate } => {
                let op = predicate.operator();
                let mut inner = Map::new();
                inner.insert(op.keyword().to_string(), op.operand_json());
                let predicate_json = if predicate.is_negated() {
                    json!({ "$not": Value::Object(inner) })
                } else {
                    Value::Object(inner)
                };
                let mut map = Map::new();
                map.insert(field.clone(), predicate_json);
                Value::Object(map)
            }
            Clause::Compound(selector) => selector.to_json(),
            Clause::Text { search } => json!({ "$text": { "$search": search } }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_canonical_json() {
        let selector = Selector {
            op: Compound::Or,
            clauses: vec![
                Clause::Field {
                    field: "name".into(),
                    predicate: Predicate::Not(Operator::In(vec![
                        Scalar::String("mike".into()),
                        Scalar::Integer(3),
                    ])),
                },
                Clause::Field {
                    field: "age".into(),
                    predicate: Predicate::Op(Operator::Mod {
                        divisor: 3,
                        remainder: 1,
                    }),
                },
                Clause::Text {
                    search: "cat".into(),
                },
            ],
        };

        assert_eq!(
            selector.to_json(),
            json!({"$or": [
                {"name": {"$not": {"$in": ["mike", 3]}}},
                {"age": {"$mod": [3, 1]}},
                {"$text": {"$search": "cat"}}
            ]})
        );
    }

    #[test]
    fn predicate_accessors() {
        let p = Predicate::Not(Operator::Exists(true));
        assert!(p.is_negated());
        assert_eq!(p.operator().keyword(), "$exists");
    }
}
