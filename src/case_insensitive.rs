//! A small map wrapper that normalizes keys for lookup while preserving the
//! originally-inserted case for display, grounded on the same pattern
//! `knhk-workflow-engine` uses for its `ReflexCache` (`DashMap` keyed by a
//! normalized id, values holding the full record) in
//! `knhk-workflow-engine/src/cache.rs` — simplified here to a plain
//! `HashMap` since the controller is single-threaded and needs no
//! lock-free concurrent map.

use std::collections::HashMap;

/// Map from switch name to `V`, case-insensitive on lookup and insert,
/// case-preserving on display.
#[derive(Debug, Clone, Default)]
pub struct CaseInsensitiveMap<V> {
    entries: HashMap<String, (String, V)>,
}

impl<V> CaseInsensitiveMap<V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert or overwrite the value for `name`. Returns the previous
    /// `(original_case_name, value)` if one existed.
    pub fn insert(&mut self, name: &str, value: V) -> Option<(String, V)> {
        self.entries
            .insert(name.to_ascii_lowercase(), (name.to_string(), value))
    }

    /// Look up by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(&name.to_ascii_lowercase()).map(|(_, v)| v)
    }

    /// Look up by name, case-insensitively, returning a mutable reference.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.entries
            .get_mut(&name.to_ascii_lowercase())
            .map(|(_, v)| v)
    }

    /// True if `name` is present, case-insensitively.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate over `(original_case_name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(name, v)| (name.as_str(), v))
    }
}
