//! End-to-end resolution-tier tests: override precedence, per-run
//! idempotence, cross-run round-trips and decode robustness.

use flagcache::{
    CachedFlag, DecisionEngine, FieldTrialParam, FlagCache, ParamMap, PersistentStore,
    SafeModeConfig,
};
use std::path::Path;
use tempfile::NamedTempFile;

const FEATURE: CachedFlag = CachedFlag::new("TabGroups", false);
const LIMIT: FieldTrialParam<i32> = FieldTrialParam::new("TabGroups", "limit", 4);
const RATIO: FieldTrialParam<f64> = FieldTrialParam::new("TabGroups", "ratio", 1.0);
const LABEL: FieldTrialParam<String> = FieldTrialParam::new("TabGroups", "label", String::new());
const ALL: FieldTrialParam<ParamMap> = FieldTrialParam::all_params("TabGroups");

/// Engine with fixed answers for the accessors above.
struct FixedEngine;

impl DecisionEngine for FixedEngine {
    fn is_feature_enabled(&self, _feature: &str, _default: bool) -> bool {
        true
    }
    fn bool_param(&self, _feature: &str, _param: &str, default: bool) -> bool {
        default
    }
    fn int_param(&self, _feature: &str, _param: &str, _default: i32) -> i32 {
        8
    }
    fn double_param(&self, _feature: &str, _param: &str, _default: f64) -> f64 {
        3.14159
    }
    fn string_param(&self, _feature: &str, _param: &str, _default: &str) -> String {
        "grid".to_string()
    }
    fn all_params(&self, _feature: &str) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("limit".to_string(), "8".to_string());
        map.insert("ratio".to_string(), "3.14159".to_string());
        map
    }
}

/// A fresh service over an existing file, as the next process run would see
/// it.
fn next_run(path: &Path) -> FlagCache {
    let store = PersistentStore::open(path).unwrap();
    FlagCache::from_store(store, SafeModeConfig::default())
}

#[test]
fn test_compiled_defaults_before_any_snapshot() {
    let cache = FlagCache::memory().unwrap();
    assert!(!FEATURE.is_enabled(&cache));
    assert_eq!(LIMIT.get_value(&cache), 4);
    assert!((RATIO.get_value(&cache) - 1.0).abs() < f64::EPSILON);
    assert_eq!(LABEL.get_value(&cache), "");
    assert!(ALL.get_value(&cache).is_empty());
}

#[test]
fn test_get_value_is_idempotent_within_a_run() {
    let cache = FlagCache::memory().unwrap();
    let first = LIMIT.get_value(&cache);

    // Mutate the durable store behind the memo's back.
    let mut editor = cache.store().batch();
    editor.put_i32(&LIMIT.key(), 99);
    editor.commit().unwrap();

    assert_eq!(LIMIT.get_value(&cache), first);
    assert_eq!(first, 4);
}

#[test]
fn test_override_beats_every_other_tier() {
    let cache = FlagCache::memory().unwrap();

    // Durable store says disabled.
    let mut editor = cache.store().batch();
    editor.put_bool(&FEATURE.key(), false);
    editor.commit().unwrap();

    FEATURE.set_for_testing(&cache, true);
    assert!(FEATURE.is_enabled(&cache));

    cache.clear_for_testing();
    assert!(!FEATURE.is_enabled(&cache));
}

#[test]
fn test_override_beats_an_already_memoized_value() {
    let cache = FlagCache::memory().unwrap();
    assert_eq!(LIMIT.get_value(&cache), 4);

    LIMIT.set_for_testing(&cache, 12);
    assert_eq!(LIMIT.get_value(&cache), 12);
}

#[test]
fn test_snapshot_values_surface_on_the_next_run() {
    let file = NamedTempFile::new().unwrap();

    let run1 = next_run(file.path());
    run1.snapshot_writer(&FixedEngine)
        .cache_field_trial_parameters(&[&LIMIT, &RATIO, &LABEL, &ALL])
        .unwrap();
    run1.snapshot_writer(&FixedEngine)
        .cache_flags(&[&[&FEATURE]])
        .unwrap();
    drop(run1);

    let run2 = next_run(file.path());
    assert!(FEATURE.is_enabled(&run2));
    assert_eq!(LIMIT.get_value(&run2), 8);
    assert_eq!(LABEL.get_value(&run2), "grid");
    let all = ALL.get_value(&run2);
    assert_eq!(all.get("limit").map(String::as_str), Some("8"));
}

#[test]
fn test_double_round_trips_bit_for_bit_across_runs() {
    let file = NamedTempFile::new().unwrap();

    let run1 = next_run(file.path());
    run1.snapshot_writer(&FixedEngine)
        .cache_field_trial_parameters(&[&RATIO])
        .unwrap();
    drop(run1);

    let run2 = next_run(file.path());
    assert_eq!(RATIO.get_value(&run2).to_bits(), 3.14159_f64.to_bits());
}

#[test]
fn test_garbage_param_map_decodes_to_empty() {
    let cache = FlagCache::memory().unwrap();
    let mut editor = cache.store().batch();
    editor.put_string(&ALL.key(), "not json");
    editor.commit().unwrap();

    assert!(ALL.get_value(&cache).is_empty());
}

#[test]
fn test_empty_engine_string_persists_the_compiled_default() {
    struct EmptyStrings;
    impl DecisionEngine for EmptyStrings {
        fn is_feature_enabled(&self, _feature: &str, default: bool) -> bool {
            default
        }
        fn bool_param(&self, _feature: &str, _param: &str, default: bool) -> bool {
            default
        }
        fn int_param(&self, _feature: &str, _param: &str, default: i32) -> i32 {
            default
        }
        fn double_param(&self, _feature: &str, _param: &str, default: f64) -> f64 {
            default
        }
        fn string_param(&self, _feature: &str, _param: &str, _default: &str) -> String {
            String::new()
        }
        fn all_params(&self, _feature: &str) -> ParamMap {
            ParamMap::new()
        }
    }

    let named = FieldTrialParam::new("TabGroups", "style", "plain".to_string());
    let file = NamedTempFile::new().unwrap();

    let run1 = next_run(file.path());
    run1.snapshot_writer(&EmptyStrings)
        .cache_field_trial_parameters(&[&named])
        .unwrap();
    drop(run1);

    // The engine's "unset" answer persisted the compiled default instead
    // of emptiness.
    let run2 = next_run(file.path());
    assert_eq!(run2.store().get_string(&named.key(), "absent"), "plain");
    assert_eq!(named.get_value(&run2), "plain");
}

#[test]
fn test_registration_list_is_exactly_one_commit() {
    let cache = FlagCache::memory().unwrap();
    let before = cache.store().commit_count();

    cache
        .snapshot_writer(&FixedEngine)
        .cache_field_trial_parameters(&[&LIMIT, &RATIO, &ALL])
        .unwrap();

    assert_eq!(cache.store().commit_count(), before + 1);
    assert_eq!(cache.store().get_i32(&LIMIT.key(), 0), 8);
    assert!(cache.store().contains(&RATIO.key()));
    assert!(cache.store().contains(&ALL.key()));
}
