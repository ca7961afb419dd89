//! Configuration System
//!
//! Layered runtime configuration: built-in defaults, the user's global config file, an
//! explicit `--config` file and `ACTIONMAP__*` environment variables, highest last.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod paths;
mod sources;

pub use facade::ConfigLoader;

/// Backward-compatible re-export of XDG path helpers
pub mod xdg {
    pub use super::paths::*;
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionMapConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Filesystem locations for documents, caches, sessions and locks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Documents live in `<data_dir>/actionsmap/<ns>.yml`
    #[serde(default = "paths::default_data_dir")]
    pub data_dir: PathBuf,

    /// Compiled trees and session artifacts
    #[serde(default = "paths::default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Namespace lock files
    #[serde(default = "paths::default_runtime_dir")]
    pub runtime_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: paths::default_data_dir(),
            cache_dir: paths::default_cache_dir(),
            runtime_dir: paths::default_runtime_dir(),
        }
    }
}

impl PathsConfig {
    /// All three roots under one directory (tests, sandboxes).
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
            runtime_dir: root.join("run"),
        }
    }

    pub fn actionsmap_dir(&self) -> PathBuf {
        self.data_dir.join("actionsmap")
    }

    pub fn cache_actionsmap_dir(&self) -> PathBuf {
        self.cache_dir.join("actionsmap")
    }

    pub fn session_dir(&self) -> PathBuf {
        self.cache_dir.join("session")
    }
}

/// Execution lock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Unbounded when absent
    #[serde(default)]
    pub cli_timeout_secs: Option<u64>,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_http_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            cli_timeout_secs: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl LockConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cli_timeout(&self) -> Option<Duration> {
        self.cli_timeout_secs.map(Duration::from_secs)
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }
}

/// HTTP adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Mark session cookies `Secure`
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_bind() -> String {
    "127.0.0.1:6787".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl ActionMapConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (name, path) in [
            ("paths.data_dir", &self.paths.data_dir),
            ("paths.cache_dir", &self.paths.cache_dir),
            ("paths.runtime_dir", &self.paths.runtime_dir),
        ] {
            if path.as_os_str().is_empty() {
                errors.push(format!("{} cannot be empty", name));
            }
        }

        if self.lock.poll_interval_ms == 0 {
            errors.push("lock.poll_interval_ms must be greater than zero".to_string());
        }

        if self.http.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "http.bind: '{}' is not a socket address",
                self.http.bind
            ));
        }

        errors.extend(crate::logging::validate(&self.logging));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
