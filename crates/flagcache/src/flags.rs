//! Boolean feature flags cached across runs.

use crate::key;
use crate::service::FlagCache;
use tracing::warn;

/// A feature flag whose last-known engine verdict is cached in the durable
/// store so the next run can read it before the engine initializes.
///
/// Flags are declared as constants and resolved against a [`FlagCache`]:
///
/// ```
/// use flagcache::CachedFlag;
///
/// const TAB_GROUPS: CachedFlag = CachedFlag::new("TabGroups", false);
/// ```
#[derive(Debug, Clone)]
pub struct CachedFlag {
    feature: &'static str,
    default: bool,
    default_for_tests: Option<bool>,
}

impl CachedFlag {
    /// A flag for `feature` with its compiled default.
    pub const fn new(feature: &'static str, default: bool) -> Self {
        Self {
            feature,
            default,
            default_for_tests: None,
        }
    }

    /// A flag that carries a distinct default for test harnesses. Production
    /// reads ignore it; see [`FlagCache::set_flag_defaults_for_testing`].
    pub const fn with_test_default(
        feature: &'static str,
        default: bool,
        default_for_tests: bool,
    ) -> Self {
        Self {
            feature,
            default,
            default_for_tests: Some(default_for_tests),
        }
    }

    /// The feature name this flag caches.
    pub fn feature(&self) -> &'static str {
        self.feature
    }

    /// The compiled-in default.
    pub fn default_value(&self) -> bool {
        self.default
    }

    /// The test-build default, when one was declared.
    pub fn default_for_tests(&self) -> Option<bool> {
        self.default_for_tests
    }

    /// The store key this flag caches under.
    pub fn key(&self) -> String {
        key::flag_key(self.feature)
    }

    /// Resolve the flag: override, then this run's memo, then the safe
    /// snapshot when safe mode is active, then the durable store, then the
    /// compiled default. The first read per run fixes the answer for the
    /// rest of the run.
    pub fn is_enabled(&self, cache: &FlagCache) -> bool {
        let key = self.key();
        if let Some(raw) = cache.overrides().get(&key) {
            match raw.parse::<bool>() {
                Ok(value) => return value,
                Err(_) => {
                    debug_assert!(false, "malformed override for {key}: {raw}");
                    warn!(key = %key, raw = %raw, "malformed override, using compiled default");
                    return self.default;
                }
            }
        }
        cache.values().get_or_compute_bool(&key, || {
            cache.safe_mode().on_flag_checked();
            match cache.safe_mode().bool_param(&key, self.default) {
                Some(value) => value,
                None => cache.store().get_bool(&key, self.default),
            }
        })
    }

    /// Force the flag through the override layer until overrides are
    /// cleared.
    pub fn set_for_testing(&self, cache: &FlagCache, enabled: bool) {
        cache.overrides().set(&self.key(), enabled.to_string());
    }
}
