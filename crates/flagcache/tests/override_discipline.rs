//! Override and reset discipline on a shared process-scoped service.
//!
//! These tests deliberately share one `FlagCache` the way production code
//! shares one per process. Test-only resets are not safe to run alongside
//! other readers, so every case is `#[serial]` and starts from a clean
//! slate.

use flagcache::{CachedFlag, FieldTrialParam, FlagCache, ParamMap};
use serial_test::serial;
use std::sync::OnceLock;

const FEATURE: CachedFlag = CachedFlag::new("SharedFeature", false);
const OPT_IN: CachedFlag = CachedFlag::with_test_default("SharedOptIn", false, true);
const LIMIT: FieldTrialParam<i32> = FieldTrialParam::new("SharedFeature", "limit", 10);
const ALL: FieldTrialParam<ParamMap> = FieldTrialParam::all_params("SharedFeature");

fn service() -> &'static FlagCache {
    static SERVICE: OnceLock<FlagCache> = OnceLock::new();
    SERVICE.get_or_init(|| FlagCache::memory().unwrap())
}

fn fresh() -> &'static FlagCache {
    let cache = service();
    cache.clear_for_testing();
    cache
}

#[test]
#[serial]
fn test_override_applies_and_clears_on_the_shared_service() {
    let cache = fresh();
    assert!(!FEATURE.is_enabled(cache));

    // clear_for_testing drops the memo too, so the override is visible
    // even though the flag was already resolved above.
    cache.clear_for_testing();
    FEATURE.set_for_testing(cache, true);
    assert!(FEATURE.is_enabled(cache));

    cache.clear_for_testing();
    assert!(!FEATURE.is_enabled(cache));
}

#[test]
#[serial]
fn test_typed_overrides_cover_every_kind() {
    let cache = fresh();

    LIMIT.set_for_testing(cache, 3);
    assert_eq!(LIMIT.get_value(cache), 3);

    let mut map = ParamMap::new();
    map.insert("limit".to_string(), "3".to_string());
    ALL.set_for_testing(cache, map.clone());
    assert_eq!(ALL.get_value(cache), map);
}

#[test]
#[serial]
fn test_flag_test_defaults_install_in_one_call() {
    let cache = fresh();
    cache.set_flag_defaults_for_testing(&[&FEATURE, &OPT_IN]);

    // Only the flag that declares a test default gets an override.
    assert!(OPT_IN.is_enabled(cache));
    assert!(!FEATURE.is_enabled(cache));
    assert_eq!(cache.overrides().get(&FEATURE.key()), None);
}

#[test]
#[serial]
fn test_override_does_not_leak_into_the_memo() {
    let cache = fresh();

    FEATURE.set_for_testing(cache, true);
    assert!(FEATURE.is_enabled(cache));

    // Dropping the override exposes the underlying tiers untouched: the
    // overridden read never populated the per-run memo.
    cache.overrides().clear_all();
    assert!(!FEATURE.is_enabled(cache));
}
