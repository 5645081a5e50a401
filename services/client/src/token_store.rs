use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised when persisting tokens
#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("Failed to persist {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Key/value storage for client credentials
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), TokenStoreError>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), TokenStoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TokenStoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store keeping one file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(error = %e, key = key, "Failed to read stored token");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), TokenStoreError> {
        let io_err = |source| TokenStoreError::Io {
            key: key.to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        fs::write(self.path(key), value).map_err(io_err)?;

        debug!(key = key, dir = %self.dir.display(), "Token stored");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TokenStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}
