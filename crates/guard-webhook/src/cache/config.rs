//! Decision cache configuration

use std::time::Duration;

use super::error::{CacheError, CacheResult};

/// Default number of independently locked shards
pub const DEFAULT_SHARDS: usize = 128;

/// Default hard cap on stored decisions across all shards
pub const DEFAULT_MAX_ENTRIES: usize = 65_536;

/// Default per-entry size ceiling in bytes
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 1024;

/// Default time after which a decision is no longer served
pub const DEFAULT_LIFE_WINDOW: Duration = Duration::from_secs(3 * 60);

/// Default interval between background sweeps
pub const DEFAULT_CLEAN_WINDOW: Duration = Duration::from_secs(60);

/// Decision cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of shards, must be a non-zero power of two
    pub shards: usize,
    /// Hard maximum total entry count; oldest entries are evicted first
    pub max_entries: usize,
    /// Entries whose key plus value exceed this many bytes are rejected
    pub max_entry_size: usize,
    /// Age after which an entry is treated as absent
    pub life_window: Duration,
    /// How often the sweeper drops expired entries
    pub clean_window: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            life_window: DEFAULT_LIFE_WINDOW,
            clean_window: DEFAULT_CLEAN_WINDOW,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    #[must_use]
    pub const fn with_max_entry_size(mut self, max: usize) -> Self {
        self.max_entry_size = max;
        self
    }

    #[must_use]
    pub const fn with_life_window(mut self, window: Duration) -> Self {
        self.life_window = window;
        self
    }

    #[must_use]
    pub const fn with_clean_window(mut self, window: Duration) -> Self {
        self.clean_window = window;
        self
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.shards == 0 || !self.shards.is_power_of_two() {
            return Err(CacheError::InvalidConfig(format!(
                "shards must be a non-zero power of two, got {}",
                self.shards
            )));
        }
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "max_entries must be greater than zero".into(),
            ));
        }
        if self.life_window.is_zero() {
            return Err(CacheError::InvalidConfig(
                "life_window must be greater than zero".into(),
            ));
        }
        if self.clean_window.is_zero() {
            return Err(CacheError::InvalidConfig(
                "clean_window must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
