//! Property-based test generators using proptest.
//!
//! Documents draw their fields from a small fixed set so that generated
//! selectors hit them often. Generated values are strings, numbers,
//! booleans and non-empty arrays of those; nulls, empty arrays and objects
//! are left out because SQL stores all three as `NULL`, which `$exists`
//! reads differently from the in-memory matcher.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Field names used by generated documents and selectors.
pub const FIELDS: [&str; 3] = ["a", "b", "c"];

/// Strategy for generating a field name from [`FIELDS`].
pub fn field_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(FIELDS.to_vec())
}

/// Strategy for generating a scalar: string, integer, float or boolean.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => prop::sample::select(vec!["x", "y", "z", "xy", "X", "", "31", "4"]).prop_map(|s| json!(s)),
        3 => (-5i64..=5).prop_map(|i| json!(i)),
        2 => (-10i64..=10).prop_map(|half| json!(half as f64 / 2.0)),
        1 => any::<bool>().prop_map(|b| json!(b)),
    ]
}

/// Strategy for generating a field value: a scalar or a non-empty array of
/// scalars.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => scalar_strategy(),
        1 => prop::collection::vec(scalar_strategy(), 1..4).prop_map(Value::Array),
    ]
}

/// Strategy for generating a document body with any subset of [`FIELDS`].
pub fn document_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::vec(prop::option::of(field_value_strategy()), FIELDS.len()).prop_map(|values| {
        FIELDS
            .iter()
            .zip(values)
            .filter_map(|(field, value)| value.map(|v| (field.to_string(), v)))
            .collect()
    })
}

/// Strategy for generating a batch of document bodies.
pub fn documents_strategy(max: usize) -> impl Strategy<Value = Vec<Map<String, Value>>> {
    prop::collection::vec(document_strategy(), 0..max)
}

/// Strategy for generating the operator object of a field clause.
///
/// Every generated operator can be answered from a JSON index, so a
/// single-field selector built from it is fully covered by an index on that
/// field.
pub fn indexable_operator_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        scalar_strategy().prop_map(|v| json!({"$eq": v})),
        scalar_strategy().prop_map(|v| json!({"$ne": v})),
        scalar_strategy().prop_map(|v| json!({"$gt": v})),
        scalar_strategy().prop_map(|v| json!({"$gte": v})),
        scalar_strategy().prop_map(|v| json!({"$lt": v})),
        scalar_strategy().prop_map(|v| json!({"$lte": v})),
        prop::collection::vec(scalar_strategy(), 0..4).prop_map(|v| json!({"$in": v})),
        prop::collection::vec(scalar_strategy(), 0..4).prop_map(|v| json!({"$nin": v})),
        any::<bool>().prop_map(|b| json!({"$exists": b})),
        (prop::sample::select(vec![2i64, 3, -3]), prop::sample::select(vec![0i64, 1, -1, 2]))
            .prop_map(|(d, r)| json!({"$mod": [d, r]})),
    ]
}

/// Strategy for generating a single-field selector over one field.
pub fn single_field_selector_strategy(field: &'static str) -> impl Strategy<Value = Value> {
    (indexable_operator_strategy(), 0usize..3).prop_map(move |(op, nots)| {
        let mut predicate = op;
        for _ in 0..nots {
            predicate = json!({"$not": predicate});
        }
        json!({ field: predicate })
    })
}

/// Strategy for generating raw selectors of bounded depth.
///
/// Raw selectors use the shorthand forms (bare values, implicit `$and`,
/// `$ne`, `$nin`, stacked `$not`s) that normalization rewrites.
pub fn selector_strategy() -> impl Strategy<Value = Value> {
    let clause = (field_strategy(), prop_oneof![
        scalar_strategy(),
        indexable_operator_strategy(),
        (0u64..3).prop_map(|n| json!({"$size": n})),
        (indexable_operator_strategy(), 1usize..4).prop_map(|(op, nots)| {
            (0..nots).fold(op, |inner, _| json!({"$not": inner}))
        }),
    ])
        .prop_map(|(field, predicate)| json!({ field: predicate }));

    clause.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|clauses| json!({"$and": clauses})),
            prop::collection::vec(inner, 0..4).prop_map(|clauses| json!({"$or": clauses})),
        ]
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
