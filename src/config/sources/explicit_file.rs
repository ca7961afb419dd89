//! Explicit config file source: the file named by `--config`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Add an explicitly requested file; unlike the global file it must exist.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Message(format!(
            "configuration file {} does not exist",
            path.display()
        )));
    }
    Ok(builder.add_source(File::from(path).required(true)))
}
