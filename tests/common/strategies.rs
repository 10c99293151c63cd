use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for generating step keys that never contain the chunk separator
pub fn step_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Strategy for generating batch items of mixed JSON types
pub fn batch_item_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(|s| json!(s)),
        any::<bool>().prop_map(|b| json!(b)),
    ]
}

/// Strategy for generating non-empty batches
pub fn batch_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(batch_item_strategy(), 1..40)
}

/// Strategy for generating chunk sizes
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    1usize..12
}
