//! Layer 3: Storage Effect Handler - Production Only
//!
//! Filesystem-backed `StorageEffects`. Each key maps to one `.dat` file under
//! the base directory; keys may contain `/` to form sub-directories. Writes go
//! through a temp file and a rename so a crash never leaves a torn record.
//!
//! This handler is not safe for concurrent writers on its own; production
//! wraps it in [`crate::SingleWriterStorage`].

use async_trait::async_trait;
use keyward_core::effects::{StorageEffects, StorageError};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

const RECORD_SUFFIX: &str = ".dat";
const TEMP_EXTENSION: &str = "tmp";

/// Filesystem-based storage handler for production use
#[derive(Debug, Clone)]
pub struct FilesystemStorageHandler {
    /// Base directory for storage files
    base_path: PathBuf,
}

impl FilesystemStorageHandler {
    /// Create a new filesystem storage handler
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Base directory
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn file_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                reason: "Key cannot be empty".to_string(),
            });
        }
        let relative = Path::new(key);
        let well_formed = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !well_formed || key.ends_with('/') {
            return Err(StorageError::InvalidKey {
                reason: format!("Key must be a relative path without '..': {key}"),
            });
        }
        Ok(self.base_path.join(format!("{key}{RECORD_SUFFIX}")))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let text = relative.to_str()?;
        let key = text.strip_suffix(RECORD_SUFFIX)?;
        Some(key.replace(std::path::MAIN_SEPARATOR, "/"))
    }
}

#[async_trait]
impl StorageEffects for FilesystemStorageHandler {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let file_path = self.file_for(key)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::WriteFailed(format!("Failed to create directory: {e}"))
            })?;
        }

        let temp_path = file_path.with_extension(TEMP_EXTENSION);
        fs::write(&temp_path, value)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("Failed to write file: {e}")))?;
        fs::rename(&temp_path, &file_path)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("Failed to commit file: {e}")))?;

        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let file_path = self.file_for(key)?;
        match fs::read(&file_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed(format!("Failed to read file: {e}"))),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let file_path = self.file_for(key)?;
        match fs::remove_file(&file_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to remove file: {e}"
            ))),
        }
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        // Keys may contain path separators, so walk the tree iteratively.
        let mut keys = Vec::new();
        let mut stack: Vec<PathBuf> = vec![self.base_path.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::ReadFailed(format!(
                        "Failed to read directory: {e}"
                    )))
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                StorageError::ReadFailed(format!("Failed to read directory entry: {e}"))
            })? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| {
                    StorageError::ReadFailed(format!("Failed to stat entry: {e}"))
                })?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if let Some(key) = self.key_for(&path) {
                    if prefix.map_or(true, |p| key.starts_with(p)) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_retrieve_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorageHandler::new(dir.path().to_path_buf());

        storage
            .store("recovery/active/acct-1", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(
            storage.retrieve("recovery/active/acct-1").await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert!(storage.remove("recovery/active/acct-1").await.unwrap());
        assert!(!storage.remove("recovery/active/acct-1").await.unwrap());
        assert_eq!(storage.retrieve("recovery/active/acct-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_keys_is_recursive_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorageHandler::new(dir.path().to_path_buf());

        for key in ["keybox/active/a", "keybox/archive/a/1", "recovery/active/a"] {
            storage.store(key, vec![1]).await.unwrap();
        }
        assert_eq!(
            storage.list_keys(Some("keybox/")).await.unwrap(),
            vec!["keybox/active/a".to_string(), "keybox/archive/a/1".to_string()]
        );
        assert_eq!(storage.list_keys(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorageHandler::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.store("../outside", vec![]).await,
            Err(StorageError::InvalidKey { .. })
        ));
        assert!(matches!(
            storage.store("", vec![]).await,
            Err(StorageError::InvalidKey { .. })
        ));
    }
}
