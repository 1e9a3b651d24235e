//! Typed field-trial parameter accessors.
//!
//! One generic accessor covers every value kind; the kinds themselves form a
//! closed set via the sealed [`ParamValue`] trait. All kinds share one read
//! algorithm (override, then memo, then safe mode, then store, then compiled
//! default) and one write algorithm (read the engine, stage into an editor),
//! differing only in encode/decode.

use crate::key;
use crate::safe_mode::SafeModeController;
use crate::service::FlagCache;
use crate::snapshot::DecisionEngine;
use crate::store::{BatchEditor, PersistentStore};
use crate::values::{param_map_from_json, param_map_to_json, ParamMap, ReturnedValueCache};
use tracing::warn;

mod sealed {
    use crate::values::ParamMap;

    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i32 {}
    impl Sealed for f64 {}
    impl Sealed for String {}
    impl Sealed for ParamMap {}
}

/// A value kind a field-trial parameter can carry. Closed set: bool, i32,
/// f64, String and [`ParamMap`].
pub trait ParamValue: sealed::Sealed + Clone {
    /// Parse a raw override string. `None` on unparseable input.
    fn parse_override(raw: &str) -> Option<Self>;

    /// Stringify for the override layer.
    fn encode_override(value: &Self) -> String;

    /// Read from the durable store, soft-failing to `default`.
    fn from_store(store: &PersistentStore, key: &str, default: &Self) -> Self;

    /// Read from the safe-mode snapshot; `None` when safe mode is inactive.
    fn from_safe_mode(safe_mode: &SafeModeController, key: &str, default: &Self) -> Option<Self>;

    /// Authoritative value from the decision engine, as it should be
    /// persisted for the next run.
    fn from_engine(engine: &dyn DecisionEngine, feature: &str, param: &str, default: &Self)
        -> Self;

    /// Stage a value into a batch editor under this kind's encoding.
    fn stage(editor: &mut BatchEditor, key: &str, value: &Self);

    /// Memoize through this kind's table.
    fn memoize<F: FnOnce() -> Self>(values: &ReturnedValueCache, key: &str, compute: F) -> Self;
}

impl ParamValue for bool {
    fn parse_override(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    fn encode_override(value: &Self) -> String {
        value.to_string()
    }

    fn from_store(store: &PersistentStore, key: &str, default: &Self) -> Self {
        store.get_bool(key, *default)
    }

    fn from_safe_mode(safe_mode: &SafeModeController, key: &str, default: &Self) -> Option<Self> {
        safe_mode.bool_param(key, *default)
    }

    fn from_engine(
        engine: &dyn DecisionEngine,
        feature: &str,
        param: &str,
        default: &Self,
    ) -> Self {
        engine.bool_param(feature, param, *default)
    }

    fn stage(editor: &mut BatchEditor, key: &str, value: &Self) {
        editor.put_bool(key, *value);
    }

    fn memoize<F: FnOnce() -> Self>(values: &ReturnedValueCache, key: &str, compute: F) -> Self {
        values.get_or_compute_bool(key, compute)
    }
}

impl ParamValue for i32 {
    fn parse_override(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    fn encode_override(value: &Self) -> String {
        value.to_string()
    }

    fn from_store(store: &PersistentStore, key: &str, default: &Self) -> Self {
        store.get_i32(key, *default)
    }

    fn from_safe_mode(safe_mode: &SafeModeController, key: &str, default: &Self) -> Option<Self> {
        safe_mode.int_param(key, *default)
    }

    fn from_engine(
        engine: &dyn DecisionEngine,
        feature: &str,
        param: &str,
        default: &Self,
    ) -> Self {
        engine.int_param(feature, param, *default)
    }

    fn stage(editor: &mut BatchEditor, key: &str, value: &Self) {
        editor.put_i32(key, *value);
    }

    fn memoize<F: FnOnce() -> Self>(values: &ReturnedValueCache, key: &str, compute: F) -> Self {
        values.get_or_compute_int(key, compute)
    }
}

impl ParamValue for f64 {
    fn parse_override(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    fn encode_override(value: &Self) -> String {
        value.to_string()
    }

    /// Doubles persist as their raw bit pattern so they round-trip exactly.
    fn from_store(store: &PersistentStore, key: &str, default: &Self) -> Self {
        let bits = store.get_i64(key, default.to_bits() as i64);
        f64::from_bits(bits as u64)
    }

    fn from_safe_mode(safe_mode: &SafeModeController, key: &str, default: &Self) -> Option<Self> {
        safe_mode.double_param(key, *default)
    }

    fn from_engine(
        engine: &dyn DecisionEngine,
        feature: &str,
        param: &str,
        default: &Self,
    ) -> Self {
        engine.double_param(feature, param, *default)
    }

    fn stage(editor: &mut BatchEditor, key: &str, value: &Self) {
        editor.put_i64(key, value.to_bits() as i64);
    }

    fn memoize<F: FnOnce() -> Self>(values: &ReturnedValueCache, key: &str, compute: F) -> Self {
        values.get_or_compute_double(key, compute)
    }
}

impl ParamValue for String {
    fn parse_override(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn encode_override(value: &Self) -> String {
        value.clone()
    }

    fn from_store(store: &PersistentStore, key: &str, default: &Self) -> Self {
        store.get_string(key, default)
    }

    fn from_safe_mode(safe_mode: &SafeModeController, key: &str, default: &Self) -> Option<Self> {
        safe_mode.string_param(key, default)
    }

    /// An empty authoritative string falls back to the compiled default
    /// rather than persisting emptiness.
    fn from_engine(
        engine: &dyn DecisionEngine,
        feature: &str,
        param: &str,
        default: &Self,
    ) -> Self {
        let value = engine.string_param(feature, param, default);
        if value.is_empty() {
            default.clone()
        } else {
            value
        }
    }

    fn stage(editor: &mut BatchEditor, key: &str, value: &Self) {
        editor.put_string(key, value);
    }

    fn memoize<F: FnOnce() -> Self>(values: &ReturnedValueCache, key: &str, compute: F) -> Self {
        values.get_or_compute_string(key, compute)
    }
}

impl ParamValue for ParamMap {
    fn parse_override(raw: &str) -> Option<Self> {
        Some(param_map_from_json(raw))
    }

    fn encode_override(value: &Self) -> String {
        param_map_to_json(value)
    }

    fn from_store(store: &PersistentStore, key: &str, default: &Self) -> Self {
        let raw = store.get_string(key, "");
        if raw.is_empty() {
            default.clone()
        } else {
            param_map_from_json(&raw)
        }
    }

    fn from_safe_mode(safe_mode: &SafeModeController, key: &str, default: &Self) -> Option<Self> {
        safe_mode.map_param(key, default)
    }

    fn from_engine(
        engine: &dyn DecisionEngine,
        feature: &str,
        _param: &str,
        _default: &Self,
    ) -> Self {
        engine.all_params(feature)
    }

    fn stage(editor: &mut BatchEditor, key: &str, value: &Self) {
        editor.put_string(key, &param_map_to_json(value));
    }

    fn memoize<F: FnOnce() -> Self>(values: &ReturnedValueCache, key: &str, compute: F) -> Self {
        values.get_or_compute_map(key, compute)
    }
}

/// A cached field-trial parameter: `(feature, name)` identity plus a
/// compiled default of one of the [`ParamValue`] kinds.
#[derive(Debug, Clone)]
pub struct FieldTrialParam<T: ParamValue> {
    feature: &'static str,
    name: &'static str,
    default: T,
}

impl<T: ParamValue> FieldTrialParam<T> {
    /// A parameter accessor for `feature`'s parameter `name`.
    pub const fn new(feature: &'static str, name: &'static str, default: T) -> Self {
        Self {
            feature,
            name,
            default,
        }
    }

    /// The owning feature name.
    pub fn feature(&self) -> &'static str {
        self.feature
    }

    /// The parameter name; empty for the all-parameters variant.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The compiled-in default.
    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// The store key this parameter caches under.
    pub fn key(&self) -> String {
        key::param_key(self.feature, self.name)
    }

    /// Resolve the parameter value: override, then this run's memo, then the
    /// safe snapshot when safe mode is active, then the durable store, then
    /// the compiled default. Never blocks on the decision engine.
    pub fn get_value(&self, cache: &FlagCache) -> T {
        let key = self.key();
        if let Some(raw) = cache.overrides().get(&key) {
            match T::parse_override(&raw) {
                Some(value) => return value,
                None => {
                    debug_assert!(false, "malformed override for {key}: {raw}");
                    warn!(key = %key, raw = %raw, "malformed override, using compiled default");
                    return self.default.clone();
                }
            }
        }
        T::memoize(cache.values(), &key, || {
            cache.safe_mode().on_flag_checked();
            match T::from_safe_mode(cache.safe_mode(), &key, &self.default) {
                Some(value) => value,
                None => T::from_store(cache.store(), &key, &self.default),
            }
        })
    }

    /// Inject a value through the override layer, bypassing every other
    /// tier until overrides are cleared.
    pub fn set_for_testing(&self, cache: &FlagCache, value: T) {
        cache.overrides().set(&self.key(), T::encode_override(&value));
    }
}

impl FieldTrialParam<ParamMap> {
    /// Accessor for every parameter of `feature` as one map.
    pub const fn all_params(feature: &'static str) -> Self {
        Self::new(feature, "", ParamMap::new())
    }
}
