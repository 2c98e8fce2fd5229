//! Changed-field detection between two entity snapshots.

use serde_json::Value;
use std::collections::BTreeSet;

/// Top-level keys whose values differ between `old` and `new`, sorted.
///
/// A key present on only one side counts as changed. Missing snapshots, or
/// snapshots that are not JSON objects, produce no changes.
pub fn changed_fields(old: Option<&Value>, new: Option<&Value>) -> Vec<String> {
    let (Some(Value::Object(old)), Some(Value::Object(new))) = (old, new) else {
        return Vec::new();
    };

    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter(|key| old.get(key.as_str()) != new.get(key.as_str()))
        .cloned()
        .collect()
}
