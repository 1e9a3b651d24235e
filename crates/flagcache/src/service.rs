//! FlagCache: the process-scoped service owning every resolution tier.
//!
//! One instance per process lifetime, constructed at startup and passed by
//! reference into flag and parameter accessors. Holding the tiers in one
//! service rather than in per-kind globals keeps "one resolved value per key
//! per run" without hidden global state.

use crate::error::StoreResult;
use crate::flags::CachedFlag;
use crate::overrides::OverrideLayer;
use crate::safe_mode::{SafeModeConfig, SafeModeController};
use crate::snapshot::{DecisionEngine, SnapshotWriter};
use crate::store::PersistentStore;
use crate::values::ReturnedValueCache;
use std::path::Path;

/// Process-scoped cached-configuration service.
///
/// Bundles the durable store, the test override layer, this run's memoized
/// values and the safe-mode controller. `Send + Sync`; share it behind an
/// `Arc` or a `&'static` reference.
pub struct FlagCache {
    store: PersistentStore,
    overrides: OverrideLayer,
    values: ReturnedValueCache,
    safe_mode: SafeModeController,
}

impl FlagCache {
    /// Open a file-backed cache with default safe-mode tuning.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_config(path, SafeModeConfig::default())
    }

    /// Open a file-backed cache with explicit safe-mode tuning.
    pub fn open_with_config(path: &Path, config: SafeModeConfig) -> StoreResult<Self> {
        Ok(Self::from_store(PersistentStore::open(path)?, config))
    }

    /// An in-memory cache (for testing).
    pub fn memory() -> StoreResult<Self> {
        Self::memory_with_config(SafeModeConfig::default())
    }

    /// An in-memory cache with explicit safe-mode tuning (for testing).
    pub fn memory_with_config(config: SafeModeConfig) -> StoreResult<Self> {
        Ok(Self::from_store(PersistentStore::memory()?, config))
    }

    /// Build a cache over an already-open store. Lets tests reopen the same
    /// file across simulated runs.
    pub fn from_store(store: PersistentStore, config: SafeModeConfig) -> Self {
        Self {
            safe_mode: SafeModeController::new(store.clone(), config),
            store,
            overrides: OverrideLayer::default(),
            values: ReturnedValueCache::default(),
        }
    }

    /// The durable store backing this cache.
    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    /// The test-only override layer.
    pub fn overrides(&self) -> &OverrideLayer {
        &self.overrides
    }

    /// This run's memoized values.
    pub fn values(&self) -> &ReturnedValueCache {
        &self.values
    }

    /// The crash-loop controller.
    pub fn safe_mode(&self) -> &SafeModeController {
        &self.safe_mode
    }

    /// A writer that persists authoritative engine values into this cache.
    /// Call once the host decides `engine` is fully initialized.
    pub fn snapshot_writer<'a>(&'a self, engine: &'a dyn DecisionEngine) -> SnapshotWriter<'a> {
        SnapshotWriter::new(self, engine)
    }

    /// Install every flag's declared test default as an override, in one
    /// call. Flags without a test default are left alone. Test harness
    /// setup; production code never calls this.
    pub fn set_flag_defaults_for_testing(&self, flags: &[&CachedFlag]) {
        for flag in flags {
            if let Some(enabled) = flag.default_for_tests() {
                self.overrides.set(&flag.key(), enabled.to_string());
            }
        }
    }

    /// Drop every override and memoized value so the next read re-resolves.
    /// Unsafe to run concurrently with production reads; serialize between
    /// test cases.
    pub fn clear_for_testing(&self) {
        self.overrides.clear_all();
        self.values.clear_for_testing();
    }
}
