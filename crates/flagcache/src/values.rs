//! ReturnedValueCache: process-lifetime memoization of resolved values.
//!
//! One lock-guarded table per value kind. A miss resolves under that kind's
//! lock and stores the result, so a key is computed at most once per process
//! and later reads return the identical value no matter what happens to the
//! durable store in between.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Every parameter of a feature, as one name-to-value map.
pub type ParamMap = BTreeMap<String, String>;

/// Decode a JSON object of string values. Malformed input yields an empty
/// map, never an error.
pub fn param_map_from_json(raw: &str) -> ParamMap {
    match serde_json::from_str::<ParamMap>(raw) {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "malformed parameter map, using empty map");
            ParamMap::new()
        }
    }
}

/// Encode a parameter map as a JSON object string with deterministic key
/// order.
pub fn param_map_to_json(map: &ParamMap) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| String::from("{}"))
}

/// A resolved configuration value of one of the five supported kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(String),
    ParamMap(ParamMap),
}

/// Per-run memo tables, one per value kind.
#[derive(Default)]
pub struct ReturnedValueCache {
    bools: Mutex<HashMap<String, bool>>,
    ints: Mutex<HashMap<String, i32>>,
    doubles: Mutex<HashMap<String, f64>>,
    strings: Mutex<HashMap<String, String>>,
    maps: Mutex<HashMap<String, ParamMap>>,
}

fn get_or_compute<V, F>(kind: &'static str, table: &Mutex<HashMap<String, V>>, key: &str, compute: F) -> V
where
    V: Clone,
    F: FnOnce() -> V,
{
    // The lock is held across compute so a key resolves exactly once.
    let mut table = table.lock().unwrap();
    if let Some(value) = table.get(key) {
        return value.clone();
    }
    let value = compute();
    table.insert(key.to_string(), value.clone());
    debug!(key = %key, kind, "returned value memoized");
    value
}

impl ReturnedValueCache {
    /// Memoized boolean for `key`, resolving via `compute` on first access.
    pub fn get_or_compute_bool<F: FnOnce() -> bool>(&self, key: &str, compute: F) -> bool {
        get_or_compute("bool", &self.bools, key, compute)
    }

    /// Memoized 32-bit integer for `key`.
    pub fn get_or_compute_int<F: FnOnce() -> i32>(&self, key: &str, compute: F) -> i32 {
        get_or_compute("int", &self.ints, key, compute)
    }

    /// Memoized double for `key`.
    pub fn get_or_compute_double<F: FnOnce() -> f64>(&self, key: &str, compute: F) -> f64 {
        get_or_compute("double", &self.doubles, key, compute)
    }

    /// Memoized string for `key`.
    pub fn get_or_compute_string<F: FnOnce() -> String>(&self, key: &str, compute: F) -> String {
        get_or_compute("string", &self.strings, key, compute)
    }

    /// Memoized parameter map for `key`.
    pub fn get_or_compute_map<F: FnOnce() -> ParamMap>(&self, key: &str, compute: F) -> ParamMap {
        get_or_compute("map", &self.maps, key, compute)
    }

    /// Every value resolved so far, across all kinds. Feeds snapshot capture.
    pub fn dump(&self) -> Vec<(String, CachedValue)> {
        let mut out = Vec::new();
        for (key, value) in self.bools.lock().unwrap().iter() {
            out.push((key.clone(), CachedValue::Bool(*value)));
        }
        for (key, value) in self.ints.lock().unwrap().iter() {
            out.push((key.clone(), CachedValue::Int(*value)));
        }
        for (key, value) in self.doubles.lock().unwrap().iter() {
            out.push((key.clone(), CachedValue::Double(*value)));
        }
        for (key, value) in self.strings.lock().unwrap().iter() {
            out.push((key.clone(), CachedValue::Str(value.clone())));
        }
        for (key, value) in self.maps.lock().unwrap().iter() {
            out.push((key.clone(), CachedValue::ParamMap(value.clone())));
        }
        out
    }

    /// Number of memoized entries across all kinds.
    pub fn len(&self) -> usize {
        self.bools.lock().unwrap().len()
            + self.ints.lock().unwrap().len()
            + self.doubles.lock().unwrap().len()
            + self.strings.lock().unwrap().len()
            + self.maps.lock().unwrap().len()
    }

    /// True when nothing has been memoized yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty every table. Unsafe to run concurrently with production reads;
    /// serialize between test cases.
    pub fn clear_for_testing(&self) {
        self.bools.lock().unwrap().clear();
        self.ints.lock().unwrap().clear();
        self.doubles.lock().unwrap().clear();
        self.strings.lock().unwrap().clear();
        self.maps.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    // === A) Memoization ===

    #[test]
    fn test_compute_runs_once_per_key() {
        let cache = ReturnedValueCache::default();
        let calls = AtomicU32::new(0);

        for _ in 0..5 {
            let v = cache.get_or_compute_int("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                42
            });
            assert_eq!(v, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_later_compute_result_is_ignored() {
        let cache = ReturnedValueCache::default();
        assert!(cache.get_or_compute_bool("k", || true));
        // A second supplier returning something else never runs.
        assert!(cache.get_or_compute_bool("k", || false));
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let cache = ReturnedValueCache::default();
        assert_eq!(cache.get_or_compute_int("k", || 1), 1);
        assert!((cache.get_or_compute_double("k", || 2.5) - 2.5).abs() < f64::EPSILON);
        assert_eq!(cache.get_or_compute_string("k", || "s".to_string()), "s");
    }

    // === B) Dump & reset ===

    #[test]
    fn test_dump_covers_every_kind() {
        let cache = ReturnedValueCache::default();
        cache.get_or_compute_bool("b", || true);
        cache.get_or_compute_int("i", || 7);
        cache.get_or_compute_double("d", || 1.25);
        cache.get_or_compute_string("s", || "x".to_string());
        cache.get_or_compute_map("m", || {
            let mut m = ParamMap::new();
            m.insert("a".to_string(), "1".to_string());
            m
        });

        let dump = cache.dump();
        assert_eq!(dump.len(), 5);
        assert!(dump.contains(&("b".to_string(), CachedValue::Bool(true))));
        assert!(dump.contains(&("i".to_string(), CachedValue::Int(7))));
        assert!(dump.contains(&("s".to_string(), CachedValue::Str("x".to_string()))));
    }

    #[test]
    fn test_clear_for_testing_allows_recompute() {
        let cache = ReturnedValueCache::default();
        assert_eq!(cache.get_or_compute_int("k", || 1), 1);
        cache.clear_for_testing();
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_compute_int("k", || 2), 2);
    }

    // === C) Map helpers ===

    #[test]
    fn test_param_map_json_round_trip() {
        let mut map = ParamMap::new();
        map.insert("min".to_string(), "1".to_string());
        map.insert("max".to_string(), "10".to_string());
        let json = param_map_to_json(&map);
        assert_eq!(param_map_from_json(&json), map);
    }

    #[test]
    fn test_param_map_encoding_is_deterministic() {
        let mut a = ParamMap::new();
        a.insert("z".to_string(), "1".to_string());
        a.insert("a".to_string(), "2".to_string());
        let mut b = ParamMap::new();
        b.insert("a".to_string(), "2".to_string());
        b.insert("z".to_string(), "1".to_string());
        assert_eq!(param_map_to_json(&a), param_map_to_json(&b));
    }

    #[test]
    fn test_malformed_json_yields_empty_map() {
        assert!(param_map_from_json("not json").is_empty());
        assert!(param_map_from_json("").is_empty());
        assert!(param_map_from_json("[1,2]").is_empty());
        // Non-string values count as malformed, the whole map is dropped.
        assert!(param_map_from_json(r#"{"a":1}"#).is_empty());
    }

    #[test]
    fn test_empty_map_encodes_to_empty_object() {
        assert_eq!(param_map_to_json(&ParamMap::new()), "{}");
    }
}
