//! Key construction for the cached-values store.
//!
//! Three fixed prefixes keep flag values, field-trial parameter values and
//! the safe-mode snapshot copies in disjoint namespaces. Safe-mode
//! bookkeeping lives under reserved keys of its own.

/// Prefix for cached feature-flag keys.
const FLAG_PREFIX: &str = "Flags.CachedFlag.";

/// Prefix for cached field-trial parameter keys.
const PARAM_PREFIX: &str = "Flags.FieldTrialParamCached.";

/// Prefix for the last-known-good snapshot copy of any cached key.
const SAFE_VALUE_PREFIX: &str = "Flags.SafeValues.";

/// Consecutive runs that died before their end checkpoint.
pub(crate) const CRASH_STREAK_KEY: &str = "Flags.SafeMode.CrashStreak";

/// Clean runs remaining before safe mode releases.
pub(crate) const RUNS_LEFT_KEY: &str = "Flags.SafeMode.RunsLeft";

/// Set to true at the end checkpoint, lowered again at the next run's first
/// flag check. Absent entirely until configuration is consulted once.
pub(crate) const CHECKPOINT_KEY: &str = "Flags.SafeMode.ReachedCheckpoint";

/// Store key for a cached flag.
pub fn flag_key(feature: &str) -> String {
    format!("{FLAG_PREFIX}{feature}")
}

/// Store key for a cached field-trial parameter. An empty `param` names the
/// all-parameters variant for the feature.
pub fn param_key(feature: &str, param: &str) -> String {
    format!("{PARAM_PREFIX}{feature}:{param}")
}

/// Snapshot-namespace twin of any cached key.
pub(crate) fn safe_value_key(key: &str) -> String {
    format!("{SAFE_VALUE_PREFIX}{key}")
}
