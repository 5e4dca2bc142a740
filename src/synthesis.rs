//! Merge strategies for named synthesis.
//!
//! Named synthesis skips the builder machinery: fragments are plain values
//! and the configuration is the fold of those values in path order. Later
//! fragments always win; the only question is how deep the merge goes.

use serde_json::Value;

/// How fragment values are combined during named synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Shallow last-wins key merge: top-level keys from later fragments
    /// replace earlier ones wholesale.
    Merge,
    /// Deep merge: at each key, mappings on both sides merge recursively,
    /// anything else is replaced by the later fragment's value.
    RecursiveMerge,
}

impl MergeStrategy {
    /// Fold `values` in order under this strategy.
    pub fn merge_all(self, values: impl IntoIterator<Item = Value>) -> Value {
        let mut values = values.into_iter();
        let Some(first) = values.next() else {
            return Value::Null;
        };

        values.fold(first, |acc, next| match self {
            MergeStrategy::Merge => merge(acc, next),
            MergeStrategy::RecursiveMerge => merge_recursive(acc, next),
        })
    }
}

/// Shallow merge: keys in `overlay` replace keys in `base` entirely.
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                base_map.insert(key, value);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Deep merge: objects merge key-by-key, everything else is last-wins.
pub fn merge_recursive(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => merge_recursive(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Registered synthesizer for one configuration identifier.
#[derive(Debug, Clone)]
pub struct SynthesizerRegistration {
    pub strategy: MergeStrategy,
    /// Fragment filename to aggregate, when it differs from the identifier.
    pub from: Option<String>,
}

impl SynthesizerRegistration {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            strategy,
            from: None,
        }
    }

    /// Aggregate fragments registered under another identifier.
    pub fn from_fragment(strategy: MergeStrategy, from: impl Into<String>) -> Self {
        Self {
            strategy,
            from: Some(from.into()),
        }
    }
}
