#![allow(dead_code)]

use proptest::prelude::*;
use serde_json::Value;

/// Strategy for valid field names
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for JSON values a row field may hold
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 .,!?{}]{0,24}".prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Strategy for a row's field map
pub fn row_strategy() -> impl Strategy<Value = serde_json::Map<String, Value>> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..6)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for template text that contains no placeholder braces
pub fn literal_text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,:;!?\n-]{0,40}"
}

/// Strategy for a total row count and a completion order over it
pub fn completion_order_strategy() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..40).prop_flat_map(|total| {
        (
            Just(total),
            Just((0..total).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}
