//! Cache error types

use thiserror::Error;

/// Cache operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Entry too large: {size} bytes (max: {max} bytes)")]
    EntryTooLarge { size: usize, max: usize },

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_too_large_error_display() {
        let err = CacheError::EntryTooLarge {
            size: 2048,
            max: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("too large"));
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn test_invalid_config_error_display() {
        let err = CacheError::InvalidConfig("shards must be positive".to_string());
        assert!(err.to_string().contains("shards must be positive"));
    }
}
