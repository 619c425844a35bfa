use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ContentError, ContentStore, validate_key};

/// Stores each blob as one file under a root directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Use `root`, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ContentError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ContentError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ContentError> {
        let path = self.path_for(key)?;
        // Write aside, then rename, so readers never see a partial file.
        let staging = self
            .root
            .join(format!(".{key}.{}.partial", uuid::Uuid::now_v7().simple()));
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ContentError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ContentError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ContentError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("registrar-content-{}", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn round_trips_bytes_on_disk() {
        let dir = scratch_dir();
        let store = FsContentStore::open(&dir).await.unwrap();

        store.put("a.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a.txt").await.unwrap(), b"hello");
        assert!(dir.join("a.txt").exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1, "staging file left behind");

        store.delete("a.txt").await.unwrap();
        assert!(matches!(store.get("a.txt").await, Err(ContentError::NotFound(_))));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = scratch_dir();
        let store = FsContentStore::open(&dir).await.unwrap();
        assert!(matches!(
            store.put("../escape", vec![1]).await,
            Err(ContentError::InvalidKey(_))
        ));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
