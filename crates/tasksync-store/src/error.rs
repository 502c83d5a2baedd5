use tasksync_core::{TaskId, ValidationError};
use thiserror::Error;

/// Failures returned to callers. Remote failures never show up here: they are
/// absorbed into the store's error slot and the pending queue.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("failed to load persisted state: {0:#}")]
    Load(anyhow::Error),
}
