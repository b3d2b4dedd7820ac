//! Dotted-path value extraction and SQL value conversion.
//!
//! Both the index updater and the unindexed matcher read document fields
//! through [`extract`], so a field an index sees is exactly the field the
//! matcher sees.

use quarry_sql::rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

/// Looks up a dotted path (`"address.city"`) in a document body.
///
/// Returns `None` if any segment is missing or if the path passes through a
/// value that is not an object. Arrays are never traversed.
#[must_use]
pub fn extract<'a>(body: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = body.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Converts a JSON value to the SQL value stored in an index column.
///
/// Booleans are stored as `1`/`0`. Nulls, objects and arrays are stored as
/// SQL `NULL`; they are never indexed.
#[must_use]
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => SqlValue::Null,
    }
}

/// Quotes an SQL identifier, doubling any embedded double quote.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn extract_top_level_and_nested() {
        let doc = body(json!({"name": "mike", "address": {"city": "bristol", "geo": {"lat": 51}}}));
        assert_eq!(extract(&doc, "name"), Some(&json!("mike")));
        assert_eq!(extract(&doc, "address.city"), Some(&json!("bristol")));
        assert_eq!(extract(&doc, "address.geo.lat"), Some(&json!(51)));
    }

    #[test]
    fn extract_missing_or_through_scalar() {
        let doc = body(json!({"name": "mike", "pets": [{"kind": "cat"}]}));
        assert_eq!(extract(&doc, "age"), None);
        assert_eq!(extract(&doc, "name.first"), None);
        assert_eq!(extract(&doc, "pets.kind"), None);
    }

    #[test]
    fn extract_null_is_present() {
        let doc = body(json!({"spouse": null}));
        assert_eq!(extract(&doc, "spouse"), Some(&Value::Null));
    }

    #[test]
    fn sql_conversion() {
        assert_eq!(to_sql_value(&json!("a")), SqlValue::Text("a".into()));
        assert_eq!(to_sql_value(&json!(12)), SqlValue::Integer(12));
        assert_eq!(to_sql_value(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(false)), SqlValue::Integer(0));
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql_value(&json!({"a": 1})), SqlValue::Null);
        assert_eq!(to_sql_value(&json!([1])), SqlValue::Null);
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_identifier("name"), "\"name\"");
        assert_eq!(quote_identifier("my \"best\" index"), "\"my \"\"best\"\" index\"");
    }
}
