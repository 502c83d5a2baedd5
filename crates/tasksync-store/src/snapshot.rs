use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tasksync_core::{
    storage::{BlobStore, BlobStoreError},
    Task,
};
use tracing::instrument;

use crate::queue::PendingAction;

/// The one storage key the store persists under.
pub const STORAGE_KEY: &str = "tasksync-storage";

/// Durable part of the store state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub pending_queue: Vec<PendingAction>,
}

/// Reads and writes the whole [`Snapshot`] as one JSON blob.
pub struct SnapshotRepo {
    store: Arc<dyn BlobStore>,
}

impl SnapshotRepo {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// A missing blob is an empty snapshot (first launch).
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Snapshot> {
        match self.store.get(STORAGE_KEY).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(BlobStoreError::NotFound { .. }) => Ok(Snapshot::default()),
            Err(err) => Err(anyhow::anyhow!(err.to_string())),
        }
    }

    #[instrument(skip_all, fields(tasks = snapshot.tasks.len(), pending = snapshot.pending_queue.len()))]
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.store
            .put(STORAGE_KEY, &bytes)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))
    }
}
