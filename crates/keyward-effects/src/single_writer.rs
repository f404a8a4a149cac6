//! Single-writer storage actor.
//!
//! Owns a storage handler on a dedicated task and serves every read and write
//! from one bounded queue, in arrival order. Concurrent flows therefore never
//! interleave partial writes, and readers observe the state left by the last
//! completed request.

use async_trait::async_trait;
use keyward_core::effects::{StorageEffects, StorageError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum StorageCommand {
    Store {
        key: String,
        value: Vec<u8>,
        reply: oneshot::Sender<Result<(), StorageError>>,
    },
    Retrieve {
        key: String,
        reply: oneshot::Sender<Result<Option<Vec<u8>>, StorageError>>,
    },
    Remove {
        key: String,
        reply: oneshot::Sender<Result<bool, StorageError>>,
    },
    ListKeys {
        prefix: Option<String>,
        reply: oneshot::Sender<Result<Vec<String>, StorageError>>,
    },
}

/// Storage front-end that serializes all access through one writer task.
///
/// Cloning shares the same writer. The task stops once every clone is dropped.
#[derive(Clone)]
pub struct SingleWriterStorage {
    sender: mpsc::Sender<StorageCommand>,
}

impl SingleWriterStorage {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn<S>(inner: S, capacity: usize) -> Self
    where
        S: StorageEffects + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(Self::run(Arc::new(inner), receiver));
        Self { sender }
    }

    async fn run<S: StorageEffects + ?Sized>(
        inner: Arc<S>,
        mut receiver: mpsc::Receiver<StorageCommand>,
    ) {
        while let Some(command) = receiver.recv().await {
            // A dropped reply means the caller was cancelled; the write still
            // happened, so there is nothing to undo.
            match command {
                StorageCommand::Store { key, value, reply } => {
                    let _ = reply.send(inner.store(&key, value).await);
                }
                StorageCommand::Retrieve { key, reply } => {
                    let _ = reply.send(inner.retrieve(&key).await);
                }
                StorageCommand::Remove { key, reply } => {
                    let _ = reply.send(inner.remove(&key).await);
                }
                StorageCommand::ListKeys { prefix, reply } => {
                    let _ = reply.send(inner.list_keys(prefix.as_deref()).await);
                }
            }
        }
        tracing::debug!("single-writer storage task stopped");
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StorageError>>) -> StorageCommand,
    ) -> Result<T, StorageError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| StorageError::Unavailable("storage writer task stopped".to_string()))?;
        response.await.map_err(|_| {
            StorageError::Unavailable("storage writer dropped the request".to_string())
        })?
    }
}

#[async_trait]
impl StorageEffects for SingleWriterStorage {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let key = key.to_string();
        self.request(|reply| StorageCommand::Store { key, value, reply })
            .await
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_string();
        self.request(|reply| StorageCommand::Retrieve { key, reply })
            .await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let key = key.to_string();
        self.request(|reply| StorageCommand::Remove { key, reply })
            .await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.map(str::to_string);
        self.request(|reply| StorageCommand::ListKeys { prefix, reply })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilesystemStorageHandler;

    #[tokio::test]
    async fn serves_requests_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            SingleWriterStorage::spawn(FilesystemStorageHandler::new(dir.path().into()), 4);

        let writers: Vec<_> = (0..16u8)
            .map(|i| {
                let storage = storage.clone();
                tokio::spawn(async move { storage.store("counter", vec![i]).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let value = storage.retrieve("counter").await.unwrap().unwrap();
        assert_eq!(value.len(), 1);
        assert_eq!(storage.list_keys(None).await.unwrap(), vec!["counter"]);
        assert!(storage.remove("counter").await.unwrap());
    }
}
