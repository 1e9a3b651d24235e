//! Snapshot writing: reading authoritative values out of the decision
//! engine and persisting them for the next run in a single commit.

use crate::error::StoreResult;
use crate::flags::CachedFlag;
use crate::params::{FieldTrialParam, ParamValue};
use crate::service::FlagCache;
use crate::store::BatchEditor;
use crate::values::ParamMap;
use tracing::debug;

/// The host's authoritative flag source (a field-trial or experiment
/// engine). Implementations are only consulted on the snapshot path, after
/// the host decides the engine is initialized; the read path never calls
/// them.
pub trait DecisionEngine {
    /// The engine's verdict for a feature flag.
    fn is_feature_enabled(&self, feature: &str, default: bool) -> bool;

    /// A boolean parameter of `feature`.
    fn bool_param(&self, feature: &str, param: &str, default: bool) -> bool;

    /// An integer parameter of `feature`.
    fn int_param(&self, feature: &str, param: &str, default: i32) -> i32;

    /// A floating-point parameter of `feature`.
    fn double_param(&self, feature: &str, param: &str, default: f64) -> f64;

    /// A string parameter of `feature`. Empty means "unset".
    fn string_param(&self, feature: &str, param: &str, default: &str) -> String;

    /// Every parameter of `feature`. Empty when the feature has none.
    fn all_params(&self, feature: &str) -> ParamMap;
}

/// Anything the snapshot writer can persist: reads its authoritative value
/// from the engine and stages it into a batch. Object-safe so flags and
/// parameters of every kind can share one registration list.
pub trait Cacheable {
    /// Stage this accessor's current engine value into `editor`.
    fn write_cache_value(&self, engine: &dyn DecisionEngine, editor: &mut BatchEditor);
}

impl Cacheable for CachedFlag {
    fn write_cache_value(&self, engine: &dyn DecisionEngine, editor: &mut BatchEditor) {
        let enabled = engine.is_feature_enabled(self.feature(), self.default_value());
        editor.put_bool(&self.key(), enabled);
    }
}

impl<T: ParamValue> Cacheable for FieldTrialParam<T> {
    fn write_cache_value(&self, engine: &dyn DecisionEngine, editor: &mut BatchEditor) {
        let value = T::from_engine(engine, self.feature(), self.name(), self.default_value());
        T::stage(editor, &self.key(), &value);
    }
}

/// Batches engine values into the durable store.
///
/// Each `cache_*` call is exactly one store commit covering every staged
/// value, the safe snapshot refresh and the end-of-run checkpoint. Crashing
/// mid-batch leaves the previous run's values intact.
pub struct SnapshotWriter<'a> {
    cache: &'a FlagCache,
    engine: &'a dyn DecisionEngine,
}

impl<'a> SnapshotWriter<'a> {
    pub(crate) fn new(cache: &'a FlagCache, engine: &'a dyn DecisionEngine) -> Self {
        Self { cache, engine }
    }

    /// Persist the engine verdict for every flag in `registries`, in one
    /// commit. Registries are per-module flag lists concatenated here so
    /// call sites do not have to flatten them.
    pub fn cache_flags(&self, registries: &[&[&CachedFlag]]) -> StoreResult<()> {
        let mut editor = self.cache.store().batch();
        let mut staged = 0usize;
        for registry in registries {
            for flag in *registry {
                flag.write_cache_value(self.engine, &mut editor);
                staged += 1;
            }
        }
        debug!(flags = staged, "staging flag snapshot");
        self.finish(editor)
    }

    /// Persist the engine value for every parameter accessor in `params`,
    /// in one commit.
    pub fn cache_field_trial_parameters(&self, params: &[&dyn Cacheable]) -> StoreResult<()> {
        let mut editor = self.cache.store().batch();
        for param in params {
            param.write_cache_value(self.engine, &mut editor);
        }
        debug!(params = params.len(), "staging parameter snapshot");
        self.finish(editor)
    }

    fn finish(&self, mut editor: BatchEditor) -> StoreResult<()> {
        self.cache
            .safe_mode()
            .stage_end_checkpoint(&mut editor, self.cache.values());
        editor.commit()
    }
}
