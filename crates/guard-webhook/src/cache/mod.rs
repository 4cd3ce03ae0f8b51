//! Authorization decision cache
//!
//! Repeated identical authorization queries are answered from memory instead
//! of calling the remote policy API again.
//!
//! [`ShardedCache`] splits the key space over independently locked shards and
//! bounds memory three ways:
//!
//! - a hard cap on total entries, evicting the oldest entries first
//! - a per-entry size ceiling, rejecting oversized writes
//! - a life window after which entries are no longer served, with a
//!   background [`CacheSweeper`] removing them every clean window
//!
//! Wrap the cache in [`TracedStore`] to log hits and misses and feed the
//! Prometheus counters.

mod config;
mod error;
mod provider;
mod sharded;
mod traced;

use std::sync::Arc;

pub use config::{
    CacheConfig, DEFAULT_CLEAN_WINDOW, DEFAULT_LIFE_WINDOW, DEFAULT_MAX_ENTRIES,
    DEFAULT_MAX_ENTRY_SIZE, DEFAULT_SHARDS,
};
pub use error::{CacheError, CacheResult};
pub use provider::{CacheStats, DecisionStore};
pub use sharded::{CacheSweeper, ShardedCache};
pub use traced::TracedStore;

impl<T: DecisionStore + ?Sized> DecisionStore for Arc<T> {
    fn get(&self, key: &str) -> Option<bool> {
        (**self).get(key)
    }

    fn set(&self, key: &str, allowed: bool) -> CacheResult<()> {
        (**self).set(key, allowed)
    }

    fn stats(&self) -> CacheStats {
        (**self).stats()
    }

    fn entry_count(&self) -> u64 {
        (**self).entry_count()
    }

    fn close(&self) {
        (**self).close();
    }
}

/// Create the decision store used by authorizers, with its sweeper running
pub fn create_decision_store(config: CacheConfig) -> CacheResult<Arc<dyn DecisionStore>> {
    let cache = ShardedCache::start(config)?;
    tracing::info!(
        shards = config.shards,
        max_entries = config.max_entries,
        life_window_secs = config.life_window.as_secs(),
        clean_window_secs = config.clean_window.as_secs(),
        "Decision cache started"
    );
    Ok(Arc::new(TracedStore::new(cache)))
}
