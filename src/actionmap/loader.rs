//! Document loader with a fingerprint-keyed compilation cache.
//!
//! A compiled namespace is stored as `<ns>-<size>-<mtime>.bin` next to its siblings in
//! the cache directory. A document whose size or modification time changes gets a new
//! artifact name, so stale artifacts are never read; they are deleted on regeneration.
//! Two different contents with identical size and mtime reuse the stale artifact.

use super::compile::compile;
use super::document;
use super::tree::{ActionTree, NamespaceTree};
use crate::config::PathsConfig;
use crate::error::{ConfigError, StorageError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// Artifact format: 4-byte little-endian version then bincode(NamespaceTree).
const CACHE_VERSION: u32 = 1;

const DOCUMENT_EXTENSION: &str = "yml";
const CACHE_EXTENSION: &str = "bin";

/// Size and modification time of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime_secs: u64,
}

impl Fingerprint {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime_secs = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(Self {
            size: metadata.len(),
            mtime_secs,
        })
    }
}

/// Where a loaded namespace came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Compiled,
}

/// Loads namespaces from `<data_dir>/actionsmap/`.
#[derive(Debug, Clone)]
pub struct ActionMapLoader {
    documents_dir: PathBuf,
    cache_dir: PathBuf,
    use_cache: bool,
}

impl ActionMapLoader {
    /// `data_dir` and `cache_dir` are roots; `actionsmap/` is appended to both.
    pub fn new(data_dir: impl AsRef<Path>, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            documents_dir: data_dir.as_ref().join("actionsmap"),
            cache_dir: cache_dir.as_ref().join("actionsmap"),
            use_cache: true,
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(&paths.data_dir, &paths.cache_dir)
    }

    /// Disable reading and writing compiled artifacts.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn document_path(&self, namespace: &str) -> PathBuf {
        self.documents_dir
            .join(format!("{}.{}", namespace, DOCUMENT_EXTENSION))
    }

    pub fn cache_path(&self, namespace: &str, fingerprint: Fingerprint) -> PathBuf {
        self.cache_dir.join(format!(
            "{}-{}-{}.{}",
            namespace, fingerprint.size, fingerprint.mtime_secs, CACHE_EXTENSION
        ))
    }

    /// Namespaces with a document, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>, ConfigError> {
        let entries = match fs::read_dir(&self.documents_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.documents_dir.clone(),
                    source,
                })
            }
        };
        let mut namespaces: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(DOCUMENT_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .filter(|name| is_valid_namespace(name))
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }

    pub fn load(&self, namespace: &str) -> Result<NamespaceTree, ConfigError> {
        self.load_with_source(namespace).map(|(tree, _)| tree)
    }

    /// Load a namespace, reporting whether the cache served it.
    pub fn load_with_source(
        &self,
        namespace: &str,
    ) -> Result<(NamespaceTree, LoadSource), ConfigError> {
        if !is_valid_namespace(namespace) {
            return Err(ConfigError::NamespaceNotFound(namespace.to_string()));
        }
        let document_path = self.document_path(namespace);
        let fingerprint = match Fingerprint::of(&document_path) {
            Ok(fingerprint) => fingerprint,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NamespaceNotFound(namespace.to_string()))
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: document_path,
                    source,
                })
            }
        };

        if self.use_cache {
            let artifact = self.cache_path(namespace, fingerprint);
            if artifact.exists() {
                match read_artifact(&artifact) {
                    Ok(tree) if tree.name == namespace => {
                        debug!(namespace = %namespace, artifact = %artifact.display(), "Action map loaded from cache");
                        return Ok((tree, LoadSource::Cache));
                    }
                    Ok(_) => warn!(
                        namespace = %namespace,
                        artifact = %artifact.display(),
                        "Cache artifact holds another namespace, regenerating"
                    ),
                    Err(e) => warn!(
                        namespace = %namespace,
                        artifact = %artifact.display(),
                        error = %e,
                        "Unreadable cache artifact, regenerating"
                    ),
                }
            }
        }

        let tree = self.compile_document(namespace, &document_path)?;
        if self.use_cache {
            if let Err(e) = self.store(namespace, fingerprint, &tree) {
                warn!(namespace = %namespace, error = %e, "Failed to write action map cache");
            }
        }
        Ok((tree, LoadSource::Compiled))
    }

    /// Load several namespaces into one tree. An empty list loads every namespace found.
    pub fn load_all(&self, namespaces: &[String]) -> Result<ActionTree, ConfigError> {
        let names = if namespaces.is_empty() {
            self.namespaces()?
        } else {
            namespaces.to_vec()
        };
        let mut tree = ActionTree::new();
        for name in &names {
            tree.insert(self.load(name)?);
        }
        Ok(tree)
    }

    fn compile_document(
        &self,
        namespace: &str,
        path: &Path,
    ) -> Result<NamespaceTree, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = document::parse(namespace, &text)?;
        let tree = compile(namespace, doc)?;
        info!(namespace = %namespace, "Action map compiled");
        Ok(tree)
    }

    /// Replace every artifact of `namespace` with a fresh one.
    fn store(
        &self,
        namespace: &str,
        fingerprint: Fingerprint,
        tree: &NamespaceTree,
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.cache_dir)?;
        self.remove_artifacts(namespace)?;
        write_artifact(&self.cache_path(namespace, fingerprint), tree)
    }

    fn remove_artifacts(&self, namespace: &str) -> Result<(), StorageError> {
        let prefix = format!("{}-", namespace);
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(rest) = file_name.strip_prefix(&prefix) else {
                continue;
            };
            // `<size>-<mtime>.bin`: keeps `demo` from matching `demo-extra-...`.
            let is_artifact = rest
                .strip_suffix(".bin")
                .and_then(|stem| stem.split_once('-'))
                .map(|(size, mtime)| {
                    size.chars().all(|c| c.is_ascii_digit())
                        && mtime.chars().all(|c| c.is_ascii_digit())
                })
                .unwrap_or(false);
            if is_artifact {
                debug!(artifact = %path.display(), "Removing stale cache artifact");
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Namespace names double as file names.
pub fn is_valid_namespace(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn read_artifact(path: &Path) -> Result<NamespaceTree, StorageError> {
    let bytes = fs::read(path)?;
    if bytes.len() < 4 {
        return Err(StorageError::Serialization(
            "cache artifact too short".to_string(),
        ));
    }
    let version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if version != CACHE_VERSION {
        return Err(StorageError::VersionMismatch {
            expected: CACHE_VERSION,
            found: version,
        });
    }
    Ok(bincode::deserialize(&bytes[4..])?)
}

/// Uses temporary file + rename for atomic writes.
fn write_artifact(path: &Path, tree: &NamespaceTree) -> Result<(), StorageError> {
    let payload = bincode::serialize(tree)?;
    let mut serialized = Vec::with_capacity(4 + payload.len());
    serialized.extend_from_slice(&CACHE_VERSION.to_le_bytes());
    serialized.extend_from_slice(&payload);

    let temp_path = path.with_extension("bin.tmp");
    fs::write(&temp_path, &serialized)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(e)
    })
}
