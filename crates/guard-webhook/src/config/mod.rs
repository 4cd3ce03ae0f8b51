//! Configuration management
//!
//! Supports configuration loading with precedence: env > file > CLI > defaults.
//! Callers seed a [`ConfigBuilder`] from CLI flags; the file and then the
//! environment are layered on top of it.

mod azure;
mod builder;
mod env;
mod file;

pub use azure::{AzureConfig, TokenStrategy};
pub use builder::{Config, ConfigBuilder, SUPPORTED_PROVIDERS, ServerConfig, TelemetryConfig};

use crate::Result;

/// Layer the discovered config file and the environment over `builder`
pub fn load_config(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Some(path) = file::find_config_file() {
        tracing::info!("Loading configuration from {}", path.display());
        builder = file::load_from_file(&path, builder)?;
    }

    builder = env::load_from_env(builder)?;

    Ok(builder)
}

/// Layer a specific config file and the environment over `builder`
pub fn load_config_from_path(path: &std::path::Path, builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let builder = file::load_from_file(path, builder)?;
    env::load_from_env(builder)
}

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
