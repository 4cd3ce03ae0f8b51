//! Decision store trait definition

use super::error::CacheResult;

/// Decision cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Writes refused because the entry exceeded the size ceiling
    pub rejected: u64,
    /// Entries dropped to respect the entry-count cap
    pub evictions: u64,
    /// Entries dropped because they outlived the life window
    pub expirations: u64,
    pub entry_count: u64,
}

/// Key to authorization decision store
///
/// Implementations must be safe for concurrent use from many request tasks.
pub trait DecisionStore: Send + Sync {
    /// Look up a decision, `None` when absent or expired
    fn get(&self, key: &str) -> Option<bool>;

    /// Store a decision, failing only when the entry exceeds the size ceiling
    fn set(&self, key: &str, allowed: bool) -> CacheResult<()>;

    /// Snapshot of counters for observability
    fn stats(&self) -> CacheStats;

    /// Number of stored decisions, cheap enough to call on every write
    fn entry_count(&self) -> u64;

    /// Release background resources
    fn close(&self);
}
