// API-key store
//
// The directory only asks "is this key known?". Keys are administered
// out of band (`perch keys ...`), so the file-backed store re-reads the
// file on every check and takes fs2 advisory locks so the admin CLI and a
// running directory can share it.

use crate::config::constants::API_KEY_LEN;
use fs2::FileExt;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("API keys must be {expected} characters long, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("key store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("key store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Membership query used by the directory.
pub trait ApiKeyStore: Send + Sync {
    fn contains(&self, key: &str) -> Result<bool, KeyStoreError>;
}

/// Generate a new key: 32 random bytes as 64 lowercase hex characters.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn check_length(key: &str) -> Result<(), KeyStoreError> {
    if key.len() == API_KEY_LEN {
        Ok(())
    } else {
        Err(KeyStoreError::InvalidLength {
            expected: API_KEY_LEN,
            actual: key.len(),
        })
    }
}

/// In-memory key set for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashSet<String>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `keys`. Length is not checked.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: RwLock::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn insert(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(key.into());
        }
    }
}

impl ApiKeyStore for MemoryKeyStore {
    fn contains(&self, key: &str) -> Result<bool, KeyStoreError> {
        Ok(self
            .keys
            .read()
            .map(|keys| keys.contains(key))
            .unwrap_or(false))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyFile {
    #[serde(default)]
    api_keys: Vec<String>,
}

/// JSON file of keys: `{ "api_keys": ["...", ...] }`.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All keys, in insertion order. A missing file is an empty store.
    pub fn list(&self) -> Result<Vec<String>, KeyStoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        let result = read_key_file(&file);
        let _ = file.unlock();
        Ok(result?.api_keys)
    }

    /// Add a key. Returns false if it was already present.
    pub fn add(&self, key: &str) -> Result<bool, KeyStoreError> {
        check_length(key)?;
        self.update(|keys| {
            if keys.iter().any(|k| k == key) {
                false
            } else {
                keys.push(key.to_string());
                true
            }
        })
    }

    /// Remove a key. Returns false if it was not present.
    pub fn remove(&self, key: &str) -> Result<bool, KeyStoreError> {
        self.update(|keys| {
            let before = keys.len();
            keys.retain(|k| k != key);
            keys.len() != before
        })
    }

    /// Read-modify-write under an exclusive lock.
    fn update(&self, change: impl FnOnce(&mut Vec<String>) -> bool) -> Result<bool, KeyStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let result = (|| -> Result<bool, KeyStoreError> {
            let mut contents = read_key_file(&file)?;
            let changed = change(&mut contents.api_keys);
            if changed {
                let json = serde_json::to_vec_pretty(&contents)?;
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                file.write_all(&json)?;
                file.sync_all()?;
            }
            Ok(changed)
        })();

        let _ = file.unlock();
        result
    }
}

fn read_key_file(mut file: &File) -> Result<KeyFile, KeyStoreError> {
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    if contents.trim().is_empty() {
        return Ok(KeyFile::default());
    }
    Ok(serde_json::from_str(&contents)?)
}

impl ApiKeyStore for FileKeyStore {
    fn contains(&self, key: &str) -> Result<bool, KeyStoreError> {
        Ok(self.list()?.iter().any(|k| k == key))
    }
}
