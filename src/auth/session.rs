//! Session storage: the client keeps `(identifier, token)`, the server keeps only a
//! keyed hash of the pair.
//!
//! Layout under the session root:
//! - `.key`: 32 random bytes, mode 0600, created on first use
//! - `<profile>/<identifier>.hash`: hex `blake3::keyed_hash(key, identifier ":" token)`

use crate::error::{AuthError, StorageError};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const KEY_FILE: &str = ".key";
const HASH_EXTENSION: &str = "hash";
const ID_BYTES: usize = 16;
const TOKEN_BYTES: usize = 32;

/// What the client holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub id: String,
    pub token: String,
}

pub struct SessionStore {
    root: PathBuf,
    key: Mutex<Option<[u8; 32]>>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Identifiers are fixed-length lowercase hex; anything else never touches the disk.
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == ID_BYTES * 2 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_valid_profile(profile: &str) -> bool {
    !profile.is_empty()
        && !profile.starts_with('.')
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Issue a fresh token. `reuse_id` keeps a client's identifier across profiles.
    pub fn issue(&self, profile: &str, reuse_id: Option<&str>) -> Result<SessionToken, AuthError> {
        let id = match reuse_id {
            Some(id) if is_valid_session_id(id) => id.to_string(),
            _ => random_hex(ID_BYTES),
        };
        let token = random_hex(TOKEN_BYTES);
        let path = self.artifact_path(profile, &id)?;
        let digest = self.digest(&id, &token)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StorageError::from)?;
        }
        write_private(&path, digest.to_hex().as_bytes())?;
        info!(profile = %profile, "Session issued");
        Ok(SessionToken { id, token })
    }

    pub fn verify(&self, profile: &str, id: &str, token: &str) -> Result<(), AuthError> {
        if !is_valid_session_id(id) {
            return Err(AuthError::InvalidToken);
        }
        let path = self.artifact_path(profile, id)?;
        let stored = match fs::read_to_string(&path) {
            Ok(stored) => stored,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::SessionExpired)
            }
            Err(e) => return Err(StorageError::from(e).into()),
        };
        let stored = blake3::Hash::from_hex(stored.trim()).map_err(|_| AuthError::SessionExpired)?;
        // blake3::Hash equality is constant time.
        if stored == self.digest(id, token)? {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }

    /// Remove one profile's artifact. Returns whether one existed.
    pub fn revoke(&self, profile: &str, id: &str) -> Result<bool, AuthError> {
        if !is_valid_session_id(id) {
            return Ok(false);
        }
        let path = self.artifact_path(profile, id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(profile = %profile, "Session revoked");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from(e).into()),
        }
    }

    /// Remove the identifier's artifact under every profile.
    pub fn revoke_all(&self, id: &str) -> Result<usize, AuthError> {
        if !is_valid_session_id(id) {
            return Ok(0);
        }
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::from(e).into()),
        };
        let mut revoked = 0;
        for entry in entries {
            let entry = entry.map_err(StorageError::from)?;
            if !entry.file_type().map_err(StorageError::from)?.is_dir() {
                continue;
            }
            if let Some(profile) = entry.file_name().to_str() {
                if is_valid_profile(profile) && self.revoke(profile, id)? {
                    revoked += 1;
                }
            }
        }
        Ok(revoked)
    }

    fn artifact_path(&self, profile: &str, id: &str) -> Result<PathBuf, AuthError> {
        if !is_valid_profile(profile) {
            return Err(StorageError::InvalidPath(format!("profile name '{}'", profile)).into());
        }
        Ok(self
            .root
            .join(profile)
            .join(format!("{}.{}", id, HASH_EXTENSION)))
    }

    fn digest(&self, id: &str, token: &str) -> Result<blake3::Hash, StorageError> {
        let key = self.key()?;
        Ok(blake3::keyed_hash(&key, format!("{}:{}", id, token).as_bytes()))
    }

    /// Load the server key, creating it on first use.
    fn key(&self) -> Result<[u8; 32], StorageError> {
        let mut cached = self.key.lock();
        if let Some(key) = *cached {
            return Ok(key);
        }

        fs::create_dir_all(&self.root)?;
        let path = self.root.join(KEY_FILE);
        let mut key = [0u8; 32];
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
        {
            Ok(mut file) => {
                OsRng.fill_bytes(&mut key);
                file.write_all(&key)?;
                file.sync_all()?;
                info!(path = %path.display(), "Session key created");
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let bytes = fs::read(&path)?;
                if bytes.len() != key.len() {
                    return Err(StorageError::Serialization(format!(
                        "session key {} has {} bytes, expected {}",
                        path.display(),
                        bytes.len(),
                        key.len()
                    )));
                }
                key.copy_from_slice(&bytes);
            }
            Err(e) => return Err(e.into()),
        }
        *cached = Some(key);
        Ok(key)
    }
}

/// Atomic write of an owner-only file.
fn write_private(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let temp_path = path.with_extension("hash.tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&temp_path)?;
    file.write_all(contents)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(e)
    })
}
