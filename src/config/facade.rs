//! Loader facade: assembles the layered sources into an `ActionMapConfig`.

use super::merge::merge_policy;
use super::sources::{explicit_file, global_file};
use super::ActionMapConfig;
use crate::error::ConfigError;
use std::path::Path;
use tracing::debug;

/// Loads runtime configuration.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then `explicit`, then the environment.
    pub fn load(explicit: Option<&Path>) -> Result<ActionMapConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = builder.add_source(merge_policy::environment());

        let config: ActionMapConfig = builder.build()?.try_deserialize()?;
        debug!(
            data_dir = %config.paths.data_dir.display(),
            cache_dir = %config.paths.cache_dir.display(),
            "Configuration loaded"
        );
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus a single file; ignores the global file and the environment.
    pub fn load_from_file(path: &Path) -> Result<ActionMapConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = explicit_file::add_to_builder(builder, path)?;
        let config: ActionMapConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
