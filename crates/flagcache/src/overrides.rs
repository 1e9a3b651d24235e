//! OverrideLayer: test-only value injection with highest read priority.
//!
//! Entries are raw strings; typed accessors parse them per kind. Production
//! code never writes here, so the read path is a shared-lock map lookup.

use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// In-memory override table consulted before every other tier.
#[derive(Default)]
pub struct OverrideLayer {
    entries: RwLock<HashMap<String, String>>,
}

impl OverrideLayer {
    /// Install an override. Setting a key twice without clearing is a test
    /// bug; it trips an assertion in debug builds and last-write-wins in
    /// release builds.
    pub fn set(&self, key: &str, value: String) {
        let mut entries = self.entries.write().unwrap();
        let prior = entries.insert(key.to_string(), value);
        debug_assert!(prior.is_none(), "override already set for {key}");
        debug!(key = %key, "override set");
    }

    /// The raw override for `key`, if one is active.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// Drop every override.
    pub fn clear_all(&self) {
        let mut entries = self.entries.write().unwrap();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "overrides cleared");
    }

    /// True when no override is active.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_what_was_set() {
        let layer = OverrideLayer::default();
        assert_eq!(layer.get("k"), None);
        layer.set("k", "true".to_string());
        assert_eq!(layer.get("k"), Some("true".to_string()));
    }

    #[test]
    fn test_clear_all_empties_the_layer() {
        let layer = OverrideLayer::default();
        layer.set("a", "1".to_string());
        layer.set("b", "2".to_string());
        assert!(!layer.is_empty());
        layer.clear_all();
        assert!(layer.is_empty());
        assert_eq!(layer.get("a"), None);
    }

    #[test]
    fn test_set_after_clear_is_allowed() {
        let layer = OverrideLayer::default();
        layer.set("k", "1".to_string());
        layer.clear_all();
        layer.set("k", "2".to_string());
        assert_eq!(layer.get("k"), Some("2".to_string()));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "override already set")]
    fn test_double_set_asserts_in_debug() {
        let layer = OverrideLayer::default();
        layer.set("k", "1".to_string());
        layer.set("k", "2".to_string());
    }
}
