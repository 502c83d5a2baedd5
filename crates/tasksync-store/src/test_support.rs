use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use tasksync_core::{
    notify::RecordingNotifier,
    remote::{MockTaskService, RemoteError, RemoteTaskService},
    storage::InMemoryBlobStore,
    Task, TaskDraft, TaskId, TaskPage,
};
use tokio::sync::Notify;

use crate::store::{StoreOptions, TaskStore};

pub(crate) struct Harness {
    pub store: Arc<TaskStore>,
    pub remote: MockTaskService,
    pub blobs: InMemoryBlobStore,
    pub notifier: RecordingNotifier,
}

impl Harness {
    pub async fn new(online: bool) -> Self {
        Self::with_remote(MockTaskService::new(), online, |remote| {
            Arc::new(remote) as Arc<dyn RemoteTaskService>
        })
        .await
    }

    /// Build around a wrapper of the mock, e.g. [`GatedRemote`].
    pub async fn with_remote(
        remote: MockTaskService,
        online: bool,
        wrap: impl FnOnce(MockTaskService) -> Arc<dyn RemoteTaskService>,
    ) -> Self {
        let blobs = InMemoryBlobStore::new();
        let notifier = RecordingNotifier::new();
        let store = TaskStore::open(
            wrap(remote.clone()),
            Arc::new(blobs.clone()),
            Arc::new(notifier.clone()),
            StoreOptions {
                initially_online: online,
                ..StoreOptions::default()
            },
        )
        .await
        .expect("open store");
        Self {
            store: Arc::new(store),
            remote,
            blobs,
            notifier,
        }
    }

    /// Store whose first `create` waits on the returned gate.
    pub async fn gated(online: bool) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let remote_gate = gate.clone();
        let h = Self::with_remote(MockTaskService::new(), online, move |mock| {
            Arc::new(GatedRemote::new(mock, remote_gate)) as Arc<dyn RemoteTaskService>
        })
        .await;
        (h, gate)
    }

    /// A second store over the same storage and backend, as after a restart.
    pub async fn reopen(&self, online: bool) -> TaskStore {
        TaskStore::open(
            Arc::new(self.remote.clone()),
            Arc::new(self.blobs.clone()),
            Arc::new(self.notifier.clone()),
            StoreOptions {
                initially_online: online,
                ..StoreOptions::default()
            },
        )
        .await
        .expect("reopen store")
    }

    /// Seed a task both on the server and in the local list.
    pub fn seed(&self, id: &str, title: &str) -> Task {
        let task = server_task(id, title);
        self.remote.insert(task.clone());
        self.store.with_state(|s| s.tasks.push(task.clone()));
        task
    }
}

pub(crate) fn server_task(id: &str, title: &str) -> Task {
    let mut task = Task::provisional(&TaskDraft::new(title, "details"));
    task.id = TaskId::from(id);
    task.created_at = Utc::now();
    task
}

pub(crate) fn transport() -> RemoteError {
    RemoteError::Transport("connection reset".to_string())
}

/// Holds the first `create` until [`Notify`] fires, to keep a replay pass in
/// flight while the test does something else.
pub(crate) struct GatedRemote {
    inner: MockTaskService,
    gate: Arc<Notify>,
    armed: AtomicBool,
}

impl GatedRemote {
    pub fn new(inner: MockTaskService, gate: Arc<Notify>) -> Self {
        Self {
            inner,
            gate,
            armed: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl RemoteTaskService for GatedRemote {
    async fn list(&self, page: u32, size: u32) -> Result<TaskPage, RemoteError> {
        self.inner.list(page, size).await
    }

    async fn search(&self, query: &str, page: u32, size: u32) -> Result<TaskPage, RemoteError> {
        self.inner.search(query, page, size).await
    }

    async fn create(&self, draft: &TaskDraft) -> Result<Task, RemoteError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.create(draft).await
    }

    async fn update(&self, id: &TaskId, draft: &TaskDraft) -> Result<Task, RemoteError> {
        self.inner.update(id, draft).await
    }

    async fn toggle(&self, id: &TaskId) -> Result<(), RemoteError> {
        self.inner.toggle(id).await
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        self.inner.delete(id).await
    }
}
