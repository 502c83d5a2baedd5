use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use tasksync_core::storage::{BlobStore, BlobStoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

const EXTENSION: &str = "blob";

/// One file per key under `root`. Writes go through a temp file in the same
/// directory and are renamed into place, so readers see the old or the new
/// blob, never a torn one.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys may hold separators or other characters unfit for file names.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{EXTENSION}", URL_SAFE_NO_PAD.encode(key)))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), BlobStoreError> {
        fs::create_dir_all(&self.root).map_err(storage_err)?;
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(storage_err)?;
        tmp.write_all(value).map_err(storage_err)?;
        tmp.as_file().sync_all().map_err(storage_err)?;
        tmp.persist(self.path_for(key))
            .map_err(|e| storage_err(e.error))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        fs::read(self.path_for(key)).map_err(|err| match err.kind() {
            ErrorKind::NotFound => BlobStoreError::NotFound {
                key: key.to_string(),
            },
            _ => storage_err(err),
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }
}

pub(crate) fn storage_err<E: ToString>(err: E) -> BlobStoreError {
    BlobStoreError::Storage {
        reason: err.to_string(),
    }
}
