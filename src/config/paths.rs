//! Default locations, from the platform's project directories with `/tmp` fallbacks.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "actionmap";
const APPLICATION: &str = "actionmap";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

fn fallback_root() -> PathBuf {
    std::env::temp_dir().join(APPLICATION)
}

/// Root holding `actionsmap/<ns>.yml` documents.
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| fallback_root().join("data"))
}

/// Root for compiled tree artifacts and session hashes.
pub fn default_cache_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| fallback_root().join("cache"))
}

/// Root for namespace lock files; `$XDG_RUNTIME_DIR` when the platform has one.
pub fn default_runtime_dir() -> PathBuf {
    project_dirs()
        .and_then(|dirs| dirs.runtime_dir().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| fallback_root().join("run"))
}

/// Directory holding the user's global config file.
pub fn config_home() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join(APPLICATION));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join(APPLICATION))
}
