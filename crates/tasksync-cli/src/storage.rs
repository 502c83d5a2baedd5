use std::{path::PathBuf, sync::Arc};

use color_eyre::Result;
use dirs::data_dir;
use tasksync_core::storage::BlobStore;
use tasksync_storage::{EncryptedBlobStore, FileBlobStore, KeyringProvider};
use tracing::debug;

use crate::config::Config;

/// Resolve the default data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("tasksync"))
}

/// Blob store for the snapshot, encrypted unless the config turns it off.
pub fn store_from_config(config: &Config) -> Result<Arc<dyn BlobStore>> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, encrypt = config.storage.encrypt, "initializing blob store");
    let files = FileBlobStore::new(root);
    if config.storage.encrypt {
        Ok(Arc::new(EncryptedBlobStore::new(
            files,
            KeyringProvider::default(),
        )))
    } else {
        Ok(Arc::new(files))
    }
}

/// Encrypted store rooted at `root` with a throwaway key.
#[cfg(test)]
pub fn test_store(
    root: impl Into<PathBuf>,
) -> EncryptedBlobStore<FileBlobStore, tasksync_storage::InMemoryKeyProvider> {
    EncryptedBlobStore::new(
        FileBlobStore::new(root),
        tasksync_storage::InMemoryKeyProvider::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    #[tokio::test]
    async fn plain_store_when_encryption_is_off() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            storage: StorageConfig { encrypt: false },
            ..Config::default()
        };

        let store = store_from_config(&config).expect("store");
        store.put("k", b"plain").await.expect("put");

        let on_disk = FileBlobStore::new(dir.path()).path_for("k");
        assert_eq!(std::fs::read(on_disk).expect("read"), b"plain");
    }
}
