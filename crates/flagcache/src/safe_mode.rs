//! SafeModeController: crash-loop protection for cached configuration.
//!
//! Every run that consults cached configuration arms a checkpoint marker,
//! and clears it again once a snapshot commit completes. A run that dies in
//! between leaves the marker lowered, which the next run counts as a crash.
//! Enough consecutive crashes and the controller stops trusting the durable
//! store, substituting the last-known-good snapshot until a configured
//! number of clean runs has passed.
//!
//! Nothing in here returns an error or panics on bad persisted data: corrupt
//! state reads as "no data" and the machine starts fresh.

use crate::key;
use crate::store::{BatchEditor, PersistentStore};
use crate::values::{param_map_from_json, param_map_to_json, CachedValue, ParamMap, ReturnedValueCache};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info, warn};

fn default_crash_streak_threshold() -> u32 {
    2
}

fn default_runs_in_safe_mode() -> u32 {
    2
}

/// Tuning for crash-loop protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeModeConfig {
    /// Consecutive crashed runs before startup stops trusting the store.
    #[serde(default = "default_crash_streak_threshold")]
    pub crash_streak_threshold: u32,

    /// Clean runs to spend on the safe snapshot before trusting the store
    /// again.
    #[serde(default = "default_runs_in_safe_mode")]
    pub runs_in_safe_mode: u32,
}

impl Default for SafeModeConfig {
    fn default() -> Self {
        Self {
            crash_streak_threshold: default_crash_streak_threshold(),
            runs_in_safe_mode: default_runs_in_safe_mode(),
        }
    }
}

/// Outcome of the once-per-run startup evaluation.
#[derive(Debug, Clone, Copy)]
struct RunState {
    /// Substitute snapshot values for store reads this run.
    safe_mode: bool,
    /// No crash evidence at all; the end checkpoint may refresh the safe
    /// snapshot.
    at_rest: bool,
}

/// Tracks the persisted crash streak and swaps in the safe snapshot when it
/// crosses the threshold.
pub struct SafeModeController {
    store: PersistentStore,
    config: SafeModeConfig,
    state: Mutex<Option<RunState>>,
}

impl SafeModeController {
    pub(crate) fn new(store: PersistentStore, config: SafeModeConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(None),
        }
    }

    /// Records that this run reached the point of consulting configuration.
    /// The first call per run consumes the previous run's checkpoint marker,
    /// advances the state machine and re-arms crash detection. Later calls
    /// are no-ops.
    pub fn on_flag_checked(&self) {
        let mut state = self.state.lock().unwrap();
        if state.is_none() {
            let mut editor = self.store.batch();
            let run_state = self.evaluate_startup(&mut editor);
            if let Err(e) = editor.commit() {
                warn!(error = %e, "safe mode bookkeeping write failed");
            }
            *state = Some(run_state);
        }
    }

    /// Whether snapshot substitution is active for this run.
    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .map_or(false, |state| state.safe_mode)
    }

    /// Snapshot boolean for `key`, or `None` when safe mode is inactive and
    /// the store should be consulted instead.
    pub fn bool_param(&self, key: &str, default: bool) -> Option<bool> {
        if !self.is_active() {
            return None;
        }
        Some(self.store.get_bool(&key::safe_value_key(key), default))
    }

    /// Snapshot 32-bit integer for `key`.
    pub fn int_param(&self, key: &str, default: i32) -> Option<i32> {
        if !self.is_active() {
            return None;
        }
        Some(self.store.get_i32(&key::safe_value_key(key), default))
    }

    /// Snapshot double for `key`.
    pub fn double_param(&self, key: &str, default: f64) -> Option<f64> {
        if !self.is_active() {
            return None;
        }
        let bits = self
            .store
            .get_i64(&key::safe_value_key(key), default.to_bits() as i64);
        Some(f64::from_bits(bits as u64))
    }

    /// Snapshot string for `key`.
    pub fn string_param(&self, key: &str, default: &str) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        Some(self.store.get_string(&key::safe_value_key(key), default))
    }

    /// Snapshot parameter map for `key`.
    pub fn map_param(&self, key: &str, default: &ParamMap) -> Option<ParamMap> {
        if !self.is_active() {
            return None;
        }
        let raw = self.store.get_string(&key::safe_value_key(key), "");
        if raw.is_empty() {
            Some(default.clone())
        } else {
            Some(param_map_from_json(&raw))
        }
    }

    /// Persisted crash streak (for testing/debugging).
    pub fn crash_streak(&self) -> i32 {
        self.store.get_i32(key::CRASH_STREAK_KEY, 0)
    }

    /// Persisted clean runs left on the snapshot (for testing/debugging).
    pub fn safe_mode_runs_left(&self) -> i32 {
        self.store.get_i32(key::RUNS_LEFT_KEY, 0)
    }

    /// Stage the end-of-run checkpoint into `editor`: raise the marker, and
    /// refresh the safe snapshot from this run's returned values when the
    /// machine carries no crash evidence. Committed together with the
    /// snapshot writer's batch.
    pub(crate) fn stage_end_checkpoint(
        &self,
        editor: &mut BatchEditor,
        returned: &ReturnedValueCache,
    ) {
        // If nothing read a flag this run, consume the previous run's
        // evidence into the batch already in hand. The marker raise below
        // supersedes the lowered marker the evaluation stages.
        let mut state = self.state.lock().unwrap();
        let run_state = match *state {
            Some(run_state) => run_state,
            None => {
                let run_state = self.evaluate_startup(editor);
                *state = Some(run_state);
                run_state
            }
        };
        drop(state);

        editor.put_bool(key::CHECKPOINT_KEY, true);
        if run_state.at_rest {
            let dump = returned.dump();
            for (key, value) in &dump {
                stage_safe_value(editor, key, value);
            }
            debug!(entries = dump.len(), "safe snapshot refreshed");
        }
    }

    /// Run the once-per-run startup evaluation, staging every bookkeeping
    /// write into `editor`. The caller owns the commit.
    fn evaluate_startup(&self, editor: &mut BatchEditor) -> RunState {
        let threshold = self.config.crash_streak_threshold as i32;
        let full_runs = self.config.runs_in_safe_mode as i32;
        let streak = self.store.get_i32(key::CRASH_STREAK_KEY, 0).max(0);
        let runs_left = self.store.get_i32(key::RUNS_LEFT_KEY, 0).max(0);
        let marker = self.store.try_get_bool(key::CHECKPOINT_KEY);

        let state = match marker {
            // No usable evidence: first consultation ever, or corrupt
            // bookkeeping. Start fresh with a zero streak.
            None => {
                if streak != 0 {
                    editor.put_i32(key::CRASH_STREAK_KEY, 0);
                }
                RunState {
                    safe_mode: false,
                    at_rest: true,
                }
            }
            // The previous consulting run reached its end checkpoint.
            Some(true) => {
                if runs_left > 0 {
                    let left = runs_left - 1;
                    editor.put_i32(key::RUNS_LEFT_KEY, left);
                    if left == 0 {
                        editor.put_i32(key::CRASH_STREAK_KEY, 0);
                        info!("safe mode finished, trusting cached values again");
                        RunState {
                            safe_mode: false,
                            at_rest: true,
                        }
                    } else {
                        info!(runs_left = left, "clean run, staying on safe snapshot");
                        RunState {
                            safe_mode: true,
                            at_rest: false,
                        }
                    }
                } else {
                    if streak != 0 {
                        editor.put_i32(key::CRASH_STREAK_KEY, 0);
                    }
                    RunState {
                        safe_mode: false,
                        at_rest: true,
                    }
                }
            }
            // The previous consulting run died before its end checkpoint.
            Some(false) => {
                let streak = streak + 1;
                editor.put_i32(key::CRASH_STREAK_KEY, streak);
                if streak >= threshold {
                    editor.put_i32(key::RUNS_LEFT_KEY, full_runs);
                    warn!(streak, "crash streak at threshold, engaging safe mode");
                    RunState {
                        safe_mode: true,
                        at_rest: false,
                    }
                } else {
                    warn!(streak, "previous run died before its checkpoint");
                    RunState {
                        safe_mode: false,
                        at_rest: false,
                    }
                }
            }
        };

        // Lower the marker so a crash before the end checkpoint is visible
        // to the next run.
        editor.put_bool(key::CHECKPOINT_KEY, false);
        state
    }
}

/// Stage one returned value into the snapshot namespace.
fn stage_safe_value(editor: &mut BatchEditor, key: &str, value: &CachedValue) {
    let safe_key = key::safe_value_key(key);
    match value {
        CachedValue::Bool(v) => editor.put_bool(&safe_key, *v),
        CachedValue::Int(v) => editor.put_i32(&safe_key, *v),
        CachedValue::Double(v) => editor.put_i64(&safe_key, v.to_bits() as i64),
        CachedValue::Str(v) => editor.put_string(&safe_key, v),
        CachedValue::ParamMap(map) => editor.put_string(&safe_key, &param_map_to_json(map)),
    }
}
