use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by blob store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlobStoreError {
    /// Requested key does not exist.
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Durable named-blob storage. Every `put` replaces the whole value; callers
/// rely on implementations making that replacement atomic.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a value under a key, overwriting any existing entry.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), BlobStoreError>;

    /// Retrieve the value for a key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Remove a key and its value (idempotent).
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;
}

/// In-memory store for tests and throwaway sessions. Clones share contents, so a
/// clone handed to a second engine instance behaves like a process restart.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBlobStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, BlobStoreError> {
        self.inner.lock().map_err(|err| BlobStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), BlobStoreError> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
