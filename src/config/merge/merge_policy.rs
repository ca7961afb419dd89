//! Merge rules: defaults, override order, conflict handling.

use crate::config::paths;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Prefix for environment overrides, e.g. `ACTIONMAP__LOCK__POLL_INTERVAL_MS`.
pub const ENV_PREFIX: &str = "ACTIONMAP";

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default(
            "paths.data_dir",
            paths::default_data_dir().to_string_lossy().to_string(),
        )?
        .set_default(
            "paths.cache_dir",
            paths::default_cache_dir().to_string_lossy().to_string(),
        )?
        .set_default(
            "paths.runtime_dir",
            paths::default_runtime_dir().to_string_lossy().to_string(),
        )?
        .set_default("lock.poll_interval_ms", 500)?
        .set_default("lock.http_timeout_secs", 30)?
        .set_default("http.bind", "127.0.0.1:6787")?
        .set_default("http.secure_cookies", true)
}

/// Environment variables override every file.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
