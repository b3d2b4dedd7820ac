//! Raw selector normalization and validation.

use super::{Clause, Compound, Operator, Predicate, Scalar, Selector, SelectorError};
use serde_json::{Map, Number, Value};

/// Normalizes and validates a raw selector.
///
/// - `{"f": v}` becomes `{"f": {"$eq": v}}`
/// - several top-level keys combine under an implicit `$and`
/// - `$ne` becomes `$not: {$eq}` and `$nin` becomes `$not: {$in}`
/// - nested `$not`s collapse by parity
/// - `$mod` operands are truncated toward zero
///
/// The input is never modified. `{}` normalizes to an empty `$and`, which
/// matches every document.
///
/// # Errors
///
/// Returns a [`SelectorError`] for unknown operators, malformed clauses,
/// unusable operands and more than one `$text` clause.
pub fn normalize(raw: &Value) -> Result<Selector, SelectorError> {
    let object = as_object(raw)?;
    let mut text_seen = false;

    if object.len() == 1 {
        if let Some((key, value)) = object.iter().next() {
            if let Some(op) = compound_for(key) {
                return compound(op, key, value, &mut text_seen);
            }
        }
    }

    let clauses = object
        .iter()
        .map(|(key, value)| clause(key, value, &mut text_seen))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Selector {
        op: Compound::And,
        clauses,
    })
}

fn compound_for(key: &str) -> Option<Compound> {
    match key {
        "$and" => Some(Compound::And),
        "$or" => Some(Compound::Or),
        _ => None,
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, SelectorError> {
    value.as_object().ok_or_else(|| SelectorError::NotAnObject {
        found: value.to_string(),
    })
}

fn single_entry(object: &Map<String, Value>) -> Result<(&String, &Value), SelectorError> {
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(SelectorError::NotSingleKey {
            found: Value::Object(object.clone()).to_string(),
        }),
    }
}

fn compound(
    op: Compound,
    keyword: &str,
    value: &Value,
    text_seen: &mut bool,
) -> Result<Selector, SelectorError> {
    let items = value.as_array().ok_or_else(|| SelectorError::ExpectedArray {
        operator: keyword.to_string(),
    })?;

    let mut clauses = Vec::with_capacity(items.len());
    for item in items {
        let (key, value) = single_entry(as_object(item)?)?;
        clauses.push(clause(key, value, text_seen)?);
    }
    Ok(Selector { op, clauses })
}

fn clause(key: &str, value: &Value, text_seen: &mut bool) -> Result<Clause, SelectorError> {
    if let Some(op) = compound_for(key) {
        return compound(op, key, value, text_seen).map(Clause::Compound);
    }
    if key == "$text" {
        let search = text_search(value)?;
        if *text_seen {
            return Err(SelectorError::MultipleText);
        }
        *text_seen = true;
        return Ok(Clause::Text { search });
    }
    if key.starts_with('$') {
        return Err(if is_field_operator(key) {
            SelectorError::MisplacedOperator {
                operator: key.to_string(),
            }
        } else {
            SelectorError::UnknownOperator {
                operator: key.to_string(),
            }
        });
    }

    let predicate = match value {
        Value::Object(object) => predicate(object)?,
        other => Predicate::Op(Operator::Eq(scalar("$eq", other)?)),
    };
    Ok(Clause::Field {
        field: key.to_string(),
        predicate,
    })
}

fn text_search(value: &Value) -> Result<String, SelectorError> {
    let (key, operand) = single_entry(as_object(value)?)?;
    if key != "$search" {
        return Err(SelectorError::InvalidOperand {
            operator: "$text".into(),
            reason: format!("unexpected key {}", key),
        });
    }
    operand
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SelectorError::InvalidOperand {
            operator: "$search".into(),
            reason: "expected a string".into(),
        })
}

fn is_field_operator(key: &str) -> bool {
    matches!(
        key,
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" | "$exists" | "$in" | "$nin" | "$mod" | "$size" | "$not"
    )
}

/// Unwraps `$not` chains, counting negations, and builds the innermost
/// operator. `$ne`/`$nin` count as one extra negation.
fn predicate(object: &Map<String, Value>) -> Result<Predicate, SelectorError> {
    let mut negated = false;
    let mut current = object;
    loop {
        let (key, operand) = single_entry(current)?;
        let op = match key.as_str() {
            "$not" => {
                current = operand.as_object().ok_or_else(|| SelectorError::InvalidOperand {
                    operator: "$not".into(),
                    reason: "expected an operator object".into(),
                })?;
                negated = !negated;
                continue;
            }
            "$ne" => {
                negated = !negated;
                Operator::Eq(scalar("$ne", operand)?)
            }
            "$nin" => {
                negated = !negated;
                Operator::In(scalar_list("$nin", operand)?)
            }
            other => operator(other, operand)?,
        };
        return Ok(if negated {
            Predicate::Not(op)
        } else {
            Predicate::Op(op)
        });
    }
}

fn operator(key: &str, operand: &Value) -> Result<Operator, SelectorError> {
    Ok(match key {
        "$eq" => Operator::Eq(scalar(key, operand)?),
        "$gt" => Operator::Gt(scalar(key, operand)?),
        "$gte" => Operator::Gte(scalar(key, operand)?),
        "$lt" => Operator::Lt(scalar(key, operand)?),
        "$lte" => Operator::Lte(scalar(key, operand)?),
        "$exists" => Operator::Exists(operand.as_bool().ok_or_else(|| invalid(key, "expected true or false"))?),
        "$in" => Operator::In(scalar_list(key, operand)?),
        "$mod" => modulus(operand)?,
        "$size" => Operator::Size(
            operand
                .as_u64()
                .ok_or_else(|| invalid(key, "expected a non-negative integer"))?,
        ),
        "$text" | "$and" | "$or" => {
            return Err(SelectorError::MisplacedOperator {
                operator: key.to_string(),
            })
        }
        other => {
            return Err(SelectorError::UnknownOperator {
                operator: other.to_string(),
            })
        }
    })
}

fn invalid(operator: &str, reason: &str) -> SelectorError {
    SelectorError::InvalidOperand {
        operator: operator.to_string(),
        reason: reason.to_string(),
    }
}

fn scalar(operator: &str, value: &Value) -> Result<Scalar, SelectorError> {
    match value {
        Value::String(s) => Ok(Scalar::String(s.clone())),
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => number(operator, n),
        Value::Null => Err(invalid(operator, "null is not a valid operand")),
        Value::Array(_) | Value::Object(_) => Err(invalid(operator, "expected a string, number or boolean")),
    }
}

fn number(operator: &str, n: &Number) -> Result<Scalar, SelectorError> {
    if let Some(i) = n.as_i64() {
        return Ok(Scalar::Integer(i));
    }
    if n.is_u64() {
        return Err(invalid(operator, "integer does not fit in 64 signed bits"));
    }
    match n.as_f64() {
        Some(f) if f.is_finite() => Ok(Scalar::Float(f)),
        _ => Err(invalid(operator, "number is not representable")),
    }
}

fn scalar_list(operator: &str, value: &Value) -> Result<Vec<Scalar>, SelectorError> {
    value
        .as_array()
        .ok_or_else(|| invalid(operator, "expected an array"))?
        .iter()
        .map(|item| scalar(operator, item))
        .collect()
}

fn truncate(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?.trunc();
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn modulus(operand: &Value) -> Result<Operator, SelectorError> {
    const USAGE: &str = "expected [divisor, remainder] with a non-zero divisor, as in [2, 1]";
    let items = match operand.as_array() {
        Some(items) if items.len() == 2 => items,
        _ => return Err(invalid("$mod", USAGE)),
    };
    match (truncate(&items[0]), truncate(&items[1])) {
        (Some(divisor), Some(remainder)) if divisor != 0 => Ok(Operator::Mod { divisor, remainder }),
        _ => Err(invalid("$mod", USAGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(value: Value) -> Value {
        normalize(&value).unwrap().to_json()
    }

    #[test]
    fn implicit_and_and_eq() {
        assert_eq!(norm(json!({"f": "v"})), json!({"$and": [{"f": {"$eq": "v"}}]}));

        let selector = normalize(&json!({"name": "mike", "age": 12})).unwrap();
        assert_eq!(selector.op, Compound::And);
        assert_eq!(selector.clauses.len(), 2);
    }

    #[test]
    fn empty_selector_is_empty_and() {
        assert_eq!(norm(json!({})), json!({"$and": []}));
    }

    #[test]
    fn explicit_compounds_kept() {
        assert_eq!(
            norm(json!({"$or": [{"name": "mike"}, {"$and": [{"age": {"$gt": 3}}]}]})),
            json!({"$or": [{"name": {"$eq": "mike"}}, {"$and": [{"age": {"$gt": 3}}]}]})
        );
    }

    #[test]
    fn compound_beside_field_gets_implicit_and() {
        let selector = normalize(&json!({"name": "mike", "$or": [{"age": 1}, {"age": 2}]})).unwrap();
        assert_eq!(selector.op, Compound::And);
        assert!(selector.clauses.iter().any(|c| matches!(c, Clause::Compound(_))));
    }

    #[test]
    fn shorthand_operators() {
        assert_eq!(
            norm(json!({"name": {"$ne": "mike"}})),
            json!({"$and": [{"name": {"$not": {"$eq": "mike"}}}]})
        );
        assert_eq!(
            norm(json!({"name": {"$nin": ["a", "b"]}})),
            json!({"$and": [{"name": {"$not": {"$in": ["a", "b"]}}}]})
        );
        assert_eq!(
            norm(json!({"name": {"$not": {"$ne": "mike"}}})),
            json!({"$and": [{"name": {"$eq": "mike"}}]})
        );
    }

    #[test]
    fn not_parity() {
        let zero = norm(json!({"f": {"$eq": 1}}));
        let one = norm(json!({"f": {"$not": {"$eq": 1}}}));
        let two = norm(json!({"f": {"$not": {"$not": {"$eq": 1}}}}));
        let three = norm(json!({"f": {"$not": {"$not": {"$not": {"$eq": 1}}}}}));
        assert_eq!(zero, two);
        assert_eq!(one, three);
        assert_ne!(zero, one);
    }

    #[test]
    fn mod_truncated() {
        assert_eq!(
            norm(json!({"f": {"$mod": [2.6, 1.7]}})),
            json!({"$and": [{"f": {"$mod": [2, 1]}}]})
        );
        assert_eq!(
            norm(json!({"f": {"$mod": [-3.9, -1.2]}})),
            json!({"$and": [{"f": {"$mod": [-3, -1]}}]})
        );
    }

    #[test]
    fn mod_rejects_bad_operands() {
        for bad in [
            json!({"f": {"$mod": [0, 1]}}),
            json!({"f": {"$mod": [0.5, 1]}}),
            json!({"f": {"$mod": [2]}}),
            json!({"f": {"$mod": [2, 1, 0]}}),
            json!({"f": {"$mod": ["2", 1]}}),
            json!({"f": {"$mod": 2}}),
        ] {
            assert!(normalize(&bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn unknown_operator_rejected() {
        assert!(matches!(
            normalize(&json!({"f": {"$regex": "a.*"}})),
            Err(SelectorError::UnknownOperator { .. })
        ));
        assert!(matches!(
            normalize(&json!({"$nor": [{"f": 1}]})),
            Err(SelectorError::UnknownOperator { .. })
        ));
        assert!(matches!(
            normalize(&json!({"$eq": 1})),
            Err(SelectorError::MisplacedOperator { .. })
        ));
    }

    #[test]
    fn malformed_clauses_rejected() {
        assert!(normalize(&json!([1, 2])).is_err());
        assert!(normalize(&json!({"$and": {"f": 1}})).is_err());
        assert!(normalize(&json!({"$and": [{"f": 1, "g": 2}]})).is_err());
        assert!(normalize(&json!({"$and": ["f"]})).is_err());
        assert!(normalize(&json!({"f": {}})).is_err());
        assert!(normalize(&json!({"f": {"$eq": 1, "$gt": 0}})).is_err());
        assert!(normalize(&json!({"f": {"$not": 1}})).is_err());
    }

    #[test]
    fn operand_types() {
        assert!(normalize(&json!({"f": null})).is_err());
        assert!(normalize(&json!({"f": [1, 2]})).is_err());
        assert!(normalize(&json!({"f": {"$gt": {"a": 1}}})).is_err());
        assert!(normalize(&json!({"f": {"$exists": "yes"}})).is_err());
        assert!(normalize(&json!({"f": {"$in": "a"}})).is_err());
        assert!(normalize(&json!({"f": {"$in": [null]}})).is_err());
        assert!(normalize(&json!({"f": {"$size": -1}})).is_err());
        assert!(normalize(&json!({"f": {"$size": 1.5}})).is_err());
        assert!(normalize(&json!({"f": {"$eq": 18446744073709551615u64}})).is_err());

        assert!(normalize(&json!({"f": {"$in": []}})).is_ok());
        assert!(normalize(&json!({"f": {"$eq": 1.5}})).is_ok());
        assert!(normalize(&json!({"f": true})).is_ok());
        assert!(normalize(&json!({"f": {"$size": 0}})).is_ok());
    }

    #[test]
    fn text_clauses() {
        assert!(normalize(&json!({"$text": {"$search": "cat"}})).is_ok());
        assert!(normalize(&json!({"$or": [{"$text": {"$search": "cat"}}, {"name": "mike"}]})).is_ok());
        assert!(normalize(&json!({"$and": [{"$text": {"$search": "cat"}}, {"name": "mike"}]})).is_ok());

        assert_eq!(
            normalize(&json!({"$or": [
                {"$text": {"$search": "cat"}},
                {"$and": [{"$text": {"$search": "dog"}}]}
            ]})),
            Err(SelectorError::MultipleText)
        );
        assert!(normalize(&json!({"$text": {"$find": "cat"}})).is_err());
        assert!(normalize(&json!({"$text": {"$search": 3}})).is_err());
        assert!(matches!(
            normalize(&json!({"f": {"$text": {"$search": "cat"}}})),
            Err(SelectorError::MisplacedOperator { .. })
        ));
    }

    #[test]
    fn input_not_mutated() {
        let raw = json!({"name": {"$not": {"$not": {"$ne": "mike"}}}});
        let before = raw.clone();
        let _ = normalize(&raw).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn idempotent_on_canonical_form() {
        for raw in [
            json!({"name": "mike", "age": {"$gte": 3}}),
            json!({"$or": [{"pet": {"$nin": ["cat"]}}, {"age": {"$mod": [3.5, 1]}}]}),
            json!({"$and": [{"$text": {"$search": "x"}}, {"n": {"$not": {"$not": {"$not": {"$size": 2}}}}}]}),
            json!({}),
        ] {
            let once = normalize(&raw).unwrap();
            let twice = normalize(&once.to_json()).unwrap();
            assert_eq!(once, twice);
        }
    }
}
