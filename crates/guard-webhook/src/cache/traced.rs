//! Traced decision store wrapper for observability

use super::error::CacheResult;
use super::provider::{CacheStats, DecisionStore};
use crate::observability;

/// Wrapper that adds tracing and metrics to any `DecisionStore`
///
/// Keys embed user principal names, so they are only logged at debug level.
pub struct TracedStore<C> {
    inner: C,
}

impl<C: std::fmt::Debug> std::fmt::Debug for TracedStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedStore")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<C> TracedStore<C> {
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: DecisionStore> DecisionStore for TracedStore<C> {
    fn get(&self, key: &str) -> Option<bool> {
        let result = self.inner.get(key);

        match result {
            Some(allowed) => {
                tracing::debug!(cache.result = "hit", cache.key = key, allowed);
                observability::record_cache_hit();
            }
            None => {
                tracing::debug!(cache.result = "miss", cache.key = key);
                observability::record_cache_miss();
            }
        }

        result
    }

    fn set(&self, key: &str, allowed: bool) -> CacheResult<()> {
        let result = self.inner.set(key, allowed);

        match &result {
            Ok(()) => {
                tracing::debug!(cache.operation = "set", cache.key = key, allowed);
                observability::set_cache_size(self.inner.entry_count());
            }
            Err(e) => {
                tracing::warn!(cache.operation = "set", cache.key = key, error = %e);
                observability::record_cache_rejected();
            }
        }

        result
    }

    fn stats(&self) -> CacheStats {
        let stats = self.inner.stats();
        observability::set_cache_size(stats.entry_count);
        stats
    }

    fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    fn close(&self) {
        tracing::debug!("Closing decision cache");
        self.inner.close();
    }
}
