//! Shared parameter and value types.
//!
//! Plugins take named parameters both at construction and at each
//! invocation; both are JSON object maps so they cross the worker
//! process boundary unchanged.

use serde_json::{Map, Value};

/// A bag of named parameters (constructor or call parameters).
pub type Params = Map<String, Value>;

/// Merge constructor and call parameters for one invocation.
/// Call parameters win on collision.
pub(crate) fn merge_params(constructor: &Params, call: &Params) -> Params {
    let mut merged = constructor.clone();
    for (key, value) in call {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
