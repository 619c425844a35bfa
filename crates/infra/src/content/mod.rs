//! Blob storage for uploaded document bytes.

pub mod fs;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

pub use fs::FsContentStore;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content '{0}' not found")]
    NotFound(String),

    #[error("invalid content key '{0}'")]
    InvalidKey(String),

    #[error("content io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("content store lock poisoned")]
    Poisoned,
}

/// Keyed byte storage. Keys are generated by the registry, never by clients.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ContentError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ContentError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), ContentError>;
}

/// Keys are flat names: ASCII alphanumerics plus `-`, `_` and `.`, not
/// starting with a dot.
pub(crate) fn validate_key(key: &str) -> Result<(), ContentError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(ContentError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ContentError> {
        validate_key(key)?;
        self.blobs
            .write()
            .map_err(|_| ContentError::Poisoned)?
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ContentError> {
        self.blobs
            .read()
            .map_err(|_| ContentError::Poisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ContentError> {
        self.blobs
            .write()
            .map_err(|_| ContentError::Poisoned)?
            .remove(key);
        Ok(())
    }
}
