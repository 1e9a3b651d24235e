//! Crash-resilient cache for feature flags and field-trial parameters.
//!
//! Lets application code read flag and experiment-parameter values
//! synchronously, before the authoritative decision engine has initialized,
//! and protects the process against crash loops caused by bad cached
//! configuration. Provides:
//!
//! - Multi-tier value resolution (test override → per-run memo → safe-mode
//!   snapshot → durable store → compiled default)
//! - A crash-streak-driven safe mode substituting last-known-good values
//! - Batched snapshot persistence, one commit per registration list
//! - Typed accessors over a closed set of value kinds (bool, i32, f64,
//!   String, parameter map)
//!
//! # Quick Start
//!
//! ```no_run
//! use flagcache::{CachedFlag, FieldTrialParam, FlagCache};
//!
//! const TAB_GROUPS: CachedFlag = CachedFlag::new("TabGroups", false);
//! const TAB_LIMIT: FieldTrialParam<i32> = FieldTrialParam::new("TabGroups", "limit", 4);
//!
//! # fn main() -> Result<(), flagcache::StoreError> {
//! let cache = FlagCache::open(std::path::Path::new("flags.db"))?;
//!
//! // Early startup: resolves from the cache, never the engine.
//! if TAB_GROUPS.is_enabled(&cache) {
//!     let limit = TAB_LIMIT.get_value(&cache);
//!     println!("tab groups on, limit {limit}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Once the engine is initialized, persist its verdicts for the next run:
//!
//! ```no_run
//! # use flagcache::{CachedFlag, DecisionEngine, FlagCache};
//! # const TAB_GROUPS: CachedFlag = CachedFlag::new("TabGroups", false);
//! # fn checkpoint(cache: &FlagCache, engine: &dyn DecisionEngine) -> Result<(), flagcache::StoreError> {
//! cache.snapshot_writer(engine).cache_flags(&[&[&TAB_GROUPS]])?;
//! # Ok(())
//! # }
//! ```
//!
//! # Failure model
//!
//! Reads never fail: missing or corrupt persisted data degrades to the
//! compiled-in default, favoring availability over configuration freshness.
//! Only opening a store and committing a snapshot return [`StoreError`].

pub mod error;
pub mod flags;
pub mod key;
pub mod overrides;
pub mod params;
pub mod safe_mode;
mod schema;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod values;

pub use error::{StoreError, StoreResult};
pub use flags::CachedFlag;
pub use overrides::OverrideLayer;
pub use params::{FieldTrialParam, ParamValue};
pub use safe_mode::{SafeModeConfig, SafeModeController};
pub use service::FlagCache;
pub use snapshot::{Cacheable, DecisionEngine, SnapshotWriter};
pub use store::{BatchEditor, PersistentStore};
pub use values::{CachedValue, ParamMap, ReturnedValueCache};
