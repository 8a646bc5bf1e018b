use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::AppError;

/// Opaque byte store the blob backend uploads into. The production target is
/// an external object store; the filesystem implementation below covers
/// single-host deployments and tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), AppError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> AppError {
    AppError::BackendUnavailable(format!("object store i/o on {}: {err}", path.display()))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;
        let path = self.path_for(key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FsObjectStore {
        let dir = std::env::temp_dir().join(format!("quantdata-objects-{}", uuid::Uuid::new_v4()));
        FsObjectStore::new(dir)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = temp_store();

        store.put("series.csv", b"a,b\n1,2\n".to_vec()).await.unwrap();
        assert_eq!(
            store.get("series.csv").await.unwrap(),
            Some(b"a,b\n1,2\n".to_vec())
        );

        assert!(store.delete("series.csv").await.unwrap());
        assert_eq!(store.get("series.csv").await.unwrap(), None);
        assert!(!store.delete("series.csv").await.unwrap());
    }
}
