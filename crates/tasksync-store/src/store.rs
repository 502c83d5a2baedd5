use std::sync::{atomic::AtomicBool, Arc, Mutex, MutexGuard};

use tasksync_core::{
    notify::Notifier,
    remote::{RemoteError, RemoteTaskService},
    storage::BlobStore,
    Task, TaskDraft, TaskId, TaskPage,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::StoreError,
    queue::{has_pending_create, PendingAction},
    snapshot::{Snapshot, SnapshotRepo},
};

/// Shown when a list refresh fails and the local copy is kept.
pub const OFFLINE_NOTICE: &str = "offline, showing local data";
pub const SEARCH_FAILED: &str = "failed to search tasks";

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub page_size: u32,
    /// Connectivity assumed until the first report arrives.
    pub initially_online: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            initially_online: false,
        }
    }
}

/// Everything the store owns. Readers get clones through [`TaskStore::state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreState {
    pub tasks: Vec<Task>,
    pub pending_queue: Vec<PendingAction>,
    pub is_online: bool,
    pub current_page: u32,
    pub total_pages: u32,
    pub has_more: bool,
    pub search_query: String,
    pub loading: bool,
    pub loading_more: bool,
    pub refreshing: bool,
    /// Latest user-visible failure. Single slot, overwritten by the next one.
    pub error: Option<String>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            pending_queue: Vec::new(),
            is_online: false,
            current_page: 0,
            total_pages: 0,
            has_more: true,
            search_query: String::new(),
            loading: false,
            loading_more: false,
            refreshing: false,
            error: None,
        }
    }
}

impl StoreState {
    fn apply_page(&mut self, page: &TaskPage) {
        self.current_page = page.page_number;
        self.total_pages = page.total_pages;
        self.has_more = !page.last;
    }

    /// Placeholders whose creation is still queued.
    fn unconfirmed_tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.id.is_temporary() && has_pending_create(&self.pending_queue, &t.id))
            .cloned()
            .collect()
    }
}

/// Where an operation goes after its optimistic local effect.
enum Next<D, S> {
    /// Nothing to send, or already queued.
    Done(D),
    /// Confirm with the server, keeping what a rollback needs.
    Send(S),
}

/// Authoritative task state with optimistic mutations, an offline queue and
/// replay.
///
/// Local state sits behind a mutex that is never held across an `.await`, so
/// every optimistic change is visible before the remote call that confirms it
/// is issued. Share it as `Arc<TaskStore>`.
pub struct TaskStore {
    state: Mutex<StoreState>,
    pub(crate) remote: Arc<dyn RemoteTaskService>,
    notifier: Arc<dyn Notifier>,
    snapshots: SnapshotRepo,
    persist_lock: tokio::sync::Mutex<()>,
    pub(crate) draining: AtomicBool,
    options: StoreOptions,
}

impl TaskStore {
    /// Build the store and rehydrate tasks and the pending queue from storage.
    pub async fn open(
        remote: Arc<dyn RemoteTaskService>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let snapshots = SnapshotRepo::new(blobs);
        let Snapshot {
            tasks,
            pending_queue,
        } = snapshots.load().await.map_err(StoreError::Load)?;
        info!(
            tasks = tasks.len(),
            pending = pending_queue.len(),
            "store rehydrated"
        );

        let state = StoreState {
            tasks,
            pending_queue,
            is_online: options.initially_online,
            ..StoreState::default()
        };
        Ok(Self {
            state: Mutex::new(state),
            remote,
            notifier,
            snapshots,
            persist_lock: tokio::sync::Mutex::new(()),
            draining: AtomicBool::new(false),
            options,
        })
    }

    /// Clone of the current state.
    pub fn state(&self) -> StoreState {
        self.lock().clone()
    }

    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.lock().tasks.iter().find(|t| &t.id == id).cloned()
    }

    pub fn is_online(&self) -> bool {
        self.lock().is_online
    }

    pub fn clear_error(&self) {
        self.with_state(|s| s.error = None);
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // State is only ever replaced field by field, so a panic elsewhere
        // cannot leave it half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one synchronous critical section against the state.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        f(&mut self.lock())
    }

    fn validate(&self, draft: TaskDraft) -> Result<TaskDraft, StoreError> {
        draft.validated().map_err(|err| {
            self.with_state(|s| s.error = Some(err.to_string()));
            StoreError::from(err)
        })
    }

    /// Record connectivity. Returns `true` on an offline to online transition.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.with_state(|s| std::mem::replace(&mut s.is_online, online));
        if was_online != online {
            info!(online, "connectivity changed");
        }
        online && !was_online
    }

    /// Connectivity event entry point: every offline to online transition runs
    /// exactly one queue drain.
    pub async fn on_connectivity_change(&self, online: bool) {
        if self.set_online(online) {
            info!("connection restored, replaying pending actions");
            self.process_queue().await;
        }
    }

    /// Append to the queue and persist.
    pub async fn add_to_queue(&self, action: PendingAction) {
        debug!(kind = action.kind(), task = %action.target(), "queueing action");
        self.with_state(|s| s.pending_queue.push(action));
        self.persist().await;
    }

    /// Write tasks and queue as one blob. Failures are logged; the in-memory
    /// state stays authoritative until the next successful write.
    pub(crate) async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.with_state(|s| Snapshot {
            tasks: s.tasks.clone(),
            pending_queue: s.pending_queue.clone(),
        });
        if let Err(err) = self.snapshots.save(&snapshot).await {
            warn!(error = %err, "failed to persist store snapshot");
        }
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn add_task(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let draft = self.validate(draft)?;
        let provisional = Task::provisional(&draft);
        let temp_id = provisional.id.clone();

        let online = self.with_state(|s| {
            s.tasks.insert(0, provisional.clone());
            s.error = None;
            if !s.is_online {
                s.pending_queue
                    .push(PendingAction::create(temp_id.clone(), draft.clone()));
            }
            s.is_online
        });
        if !online {
            debug!(%temp_id, "offline, creation queued");
            self.persist().await;
            return Ok(provisional);
        }

        match self.remote.create(&draft).await {
            Ok(task) => {
                let kept = self.with_state(|s| match s.tasks.iter_mut().find(|t| t.id == temp_id) {
                    Some(slot) => {
                        *slot = task.clone();
                        true
                    }
                    None => false,
                });
                if kept {
                    self.schedule_reminder(&task).await;
                } else {
                    self.delete_confirmed_orphan(&task).await;
                }
                self.persist().await;
                Ok(task)
            }
            Err(err) => {
                warn!(error = %err, "create failed");
                let action = PendingAction::create(temp_id, draft);
                self.with_state(|s| {
                    if s.tasks.iter().all(|t| t.id != *action.target()) {
                        // Deleted locally in the meantime; nothing left to create.
                        return;
                    }
                    action.undo.revert(&mut s.tasks);
                    s.error = Some(err.to_string());
                    if !err.is_bad_request() {
                        s.pending_queue.push(action);
                    }
                });
                self.persist().await;
                Ok(provisional)
            }
        }
    }

    /// The placeholder for `task` was deleted while its creation was in
    /// flight, so the server copy has to go too.
    async fn delete_confirmed_orphan(&self, task: &Task) {
        debug!(id = %task.id, "placeholder deleted during create, removing server copy");
        match self.remote.delete(&task.id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(error = %err, id = %task.id, "delete after create failed, queueing");
                let action = PendingAction::delete(task.clone(), 0);
                self.with_state(|s| s.pending_queue.push(action));
            }
        }
    }

    /// Edit a task. Placeholders can only be edited while their creation is
    /// still queued; the edit is then queued behind it.
    #[instrument(skip_all, fields(%id))]
    pub async fn update_task(&self, id: &TaskId, draft: TaskDraft) -> Result<Task, StoreError> {
        let draft = self.validate(draft)?;

        let next = self.with_state(|s| -> Result<Next<Task, Task>, StoreError> {
            let deferred = id.is_temporary();
            let queued_create = has_pending_create(&s.pending_queue, id);
            let task = s
                .tasks
                .iter_mut()
                .find(|t| &t.id == id)
                .ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
            if deferred && !queued_create {
                return Ok(Next::Done(task.clone()));
            }

            let previous = task.clone();
            task.apply_draft(&draft);
            let updated = task.clone();
            s.error = None;
            if deferred || !s.is_online {
                s.pending_queue
                    .push(PendingAction::update(previous, draft.clone()));
                return Ok(Next::Done(updated));
            }
            Ok(Next::Send(previous))
        })?;

        let previous = match next {
            Next::Done(task) => {
                self.persist().await;
                return Ok(task);
            }
            Next::Send(previous) => previous,
        };

        match self.remote.update(id, &draft).await {
            Ok(task) => {
                self.with_state(|s| replace_by_id(&mut s.tasks, id, task.clone()));
                self.cancel_reminder(id).await;
                self.schedule_reminder(&task).await;
                self.persist().await;
                Ok(task)
            }
            Err(err) => {
                warn!(error = %err, "update failed, restoring previous copy");
                let retry = !(err.is_bad_request() || err.is_not_found());
                let action = PendingAction::update(previous.clone(), draft);
                self.with_state(|s| {
                    action.undo.revert(&mut s.tasks);
                    s.error = Some(err.to_string());
                    if retry {
                        s.pending_queue.push(action);
                    }
                });
                self.persist().await;
                Ok(previous)
            }
        }
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn toggle_task(&self, id: &TaskId) -> Result<(), StoreError> {
        type Toggle = Option<Next<Task, (Task, bool)>>;
        let next = self.with_state(|s| -> Result<Toggle, StoreError> {
            let deferred = id.is_temporary();
            let queued_create = has_pending_create(&s.pending_queue, id);
            let task = s
                .tasks
                .iter_mut()
                .find(|t| &t.id == id)
                .ok_or_else(|| StoreError::TaskNotFound(id.clone()))?;
            if deferred && !queued_create {
                return Ok(None);
            }

            let previous_completed = task.completed;
            task.completed = !previous_completed;
            let toggled = task.clone();
            if deferred || !s.is_online {
                s.pending_queue
                    .push(PendingAction::toggle(id.clone(), previous_completed));
                return Ok(Some(Next::Done(toggled)));
            }
            Ok(Some(Next::Send((toggled, previous_completed))))
        })?;

        let (toggled, previous_completed) = match next {
            None => return Ok(()),
            Some(Next::Done(toggled)) => {
                self.after_toggle(&toggled).await;
                self.persist().await;
                return Ok(());
            }
            Some(Next::Send(sent)) => sent,
        };

        match self.remote.toggle(id).await {
            Ok(()) => self.after_toggle(&toggled).await,
            Err(err) => {
                warn!(error = %err, "toggle failed, restoring previous state");
                let action = PendingAction::toggle(id.clone(), previous_completed);
                self.with_state(|s| {
                    action.undo.revert(&mut s.tasks);
                    s.error = Some(err.to_string());
                    if !err.is_not_found() {
                        s.pending_queue.push(action);
                    }
                });
            }
        }
        self.persist().await;
        Ok(())
    }

    async fn after_toggle(&self, task: &Task) {
        if task.completed && task.reminder_date.is_some() {
            self.cancel_reminder(&task.id).await;
        }
    }

    /// Delete a task. Deleting a placeholder only unwinds local state: the task,
    /// its queued creation and anything queued against it.
    #[instrument(skip_all, fields(%id))]
    pub async fn delete_task(&self, id: &TaskId) {
        if id.is_temporary() {
            self.with_state(|s| {
                s.tasks.retain(|t| &t.id != id);
                s.pending_queue.retain(|action| action.target() != id);
            });
            self.persist().await;
            return;
        }

        let next = self.with_state(|s| {
            let index = s.tasks.iter().position(|t| &t.id == id)?;
            let removed = s.tasks.remove(index);
            let action = PendingAction::delete(removed, index);
            if s.is_online {
                Some(Next::Send(action))
            } else {
                s.pending_queue.push(action);
                Some(Next::Done(()))
            }
        });
        let action = match next {
            None => {
                debug!("no such task locally, nothing to delete");
                return;
            }
            Some(Next::Done(())) => {
                self.persist().await;
                return;
            }
            Some(Next::Send(action)) => action,
        };

        match self.remote.delete(id).await {
            Ok(()) => self.cancel_reminder(id).await,
            Err(err) if err.is_not_found() => {
                debug!("already gone on the server");
                self.cancel_reminder(id).await;
            }
            Err(err) => {
                warn!(error = %err, "delete failed, restoring task");
                self.with_state(|s| {
                    action.undo.revert(&mut s.tasks);
                    s.error = Some(err.to_string());
                    s.pending_queue.push(action);
                });
            }
        }
        self.persist().await;
    }

    /// Load page 0. On failure the local tasks stay and the offline notice is
    /// shown.
    #[instrument(skip(self))]
    pub async fn fetch_tasks(&self, refresh: bool) {
        self.with_state(|s| s.error = None);
        if let Err(err) = self.load_first_page(refresh).await {
            debug!(error = %err, "list failed, keeping local tasks");
            self.with_state(|s| s.error = Some(OFFLINE_NOTICE.to_string()));
        }
    }

    pub(crate) async fn load_first_page(&self, refresh: bool) -> Result<(), RemoteError> {
        self.with_state(|s| {
            if refresh {
                s.refreshing = true;
                s.current_page = 0;
                s.search_query.clear();
            } else {
                s.loading = true;
            }
        });

        let result = self.remote.list(0, self.options.page_size).await;
        self.with_state(|s| {
            if let Ok(page) = &result {
                let mut tasks = s.unconfirmed_tasks();
                tasks.extend(page.content.iter().cloned());
                s.tasks = tasks;
                s.apply_page(page);
            }
            s.loading = false;
            s.refreshing = false;
        });
        if result.is_ok() {
            self.persist().await;
        }
        result.map(|_| ())
    }

    /// Append the next page, following the active search if there is one.
    #[instrument(skip(self))]
    pub async fn load_more_tasks(&self) {
        let next = self.with_state(|s| {
            if !s.has_more || s.loading_more {
                return None;
            }
            s.loading_more = true;
            Some((s.current_page + 1, s.search_query.clone()))
        });
        let Some((page, query)) = next else {
            return;
        };

        let result = if query.is_empty() {
            self.remote.list(page, self.options.page_size).await
        } else {
            self.remote
                .search(&query, page, self.options.page_size)
                .await
        };
        match result {
            Ok(page) => {
                self.with_state(|s| {
                    for task in &page.content {
                        if !s.tasks.iter().any(|t| t.id == task.id) {
                            s.tasks.push(task.clone());
                        }
                    }
                    s.apply_page(&page);
                    s.loading_more = false;
                });
                self.persist().await;
            }
            Err(err) => {
                debug!(error = %err, "load more failed");
                self.with_state(|s| s.loading_more = false);
            }
        }
    }

    /// Search from page 0. A blank query falls back to the plain list.
    #[instrument(skip(self))]
    pub async fn search_tasks(&self, query: &str) {
        let query = query.trim().to_string();
        self.with_state(|s| {
            s.loading = true;
            s.error = None;
            s.search_query = query.clone();
            s.current_page = 0;
        });
        if query.is_empty() {
            return self.fetch_tasks(false).await;
        }

        match self
            .remote
            .search(&query, 0, self.options.page_size)
            .await
        {
            Ok(page) => self.with_state(|s| {
                let mut tasks = s.unconfirmed_tasks();
                tasks.extend(page.content.iter().cloned());
                s.tasks = tasks;
                s.apply_page(&page);
                s.loading = false;
            }),
            Err(err) => {
                warn!(error = %err, "search failed");
                self.with_state(|s| {
                    s.error = Some(SEARCH_FAILED.to_string());
                    s.loading = false;
                });
            }
        }
    }

    pub(crate) async fn schedule_reminder(&self, task: &Task) {
        if task.reminder_date.is_none() {
            return;
        }
        if let Err(err) = self.notifier.schedule(task).await {
            warn!(error = %err, id = %task.id, "failed to schedule reminder");
        }
    }

    pub(crate) async fn cancel_reminder(&self, id: &TaskId) {
        if let Err(err) = self.notifier.cancel(id).await {
            warn!(error = %err, %id, "failed to cancel reminder");
        }
    }
}

pub(crate) fn replace_by_id(tasks: &mut [Task], id: &TaskId, replacement: Task) {
    if let Some(slot) = tasks.iter_mut().find(|t| &t.id == id) {
        *slot = replacement;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tasksync_core::{
        notify::NotifyEvent,
        remote::{RemoteCall, RemoteOp},
        ValidationError,
    };

    use super::*;
    use crate::{
        queue::Action,
        test_support::{server_task, transport, Harness},
    };

    fn draft(title: &str) -> TaskDraft {
        TaskDraft::new(title, "details")
    }

    #[tokio::test]
    async fn offline_add_queues_exactly_one_create() {
        let h = Harness::new(false).await;
        let task = h.store.add_task(draft("buy milk")).await.expect("add");

        assert!(task.id.is_temporary());
        let state = h.store.state();
        assert_eq!(state.tasks, vec![task.clone()]);
        assert_eq!(state.pending_queue.len(), 1);
        assert!(state.pending_queue[0].creates(&task.id));
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn online_add_swaps_placeholder_for_server_task() {
        let h = Harness::new(true).await;
        let task = h.store.add_task(draft("buy milk")).await.expect("add");

        assert_eq!(task.id, TaskId::from("srv-1"));
        let state = h.store.state();
        assert_eq!(state.tasks, vec![task]);
        assert!(state.pending_queue.is_empty());
        assert!(state.tasks.iter().all(|t| !t.id.is_temporary()));
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_any_change() {
        let h = Harness::new(true).await;
        let err = h
            .store
            .add_task(TaskDraft::new("   ", "details"))
            .await
            .expect_err("blank title");

        assert!(matches!(err, StoreError::Validation(ValidationError::BlankTitle)));
        let state = h.store.state();
        assert_eq!(state.error.as_deref(), Some("title is required"));
        assert!(state.tasks.is_empty());
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn online_add_transient_failure_queues_for_replay() {
        let h = Harness::new(true).await;
        h.remote.fail_next(RemoteOp::Create, transport());

        let task = h.store.add_task(draft("buy milk")).await.expect("add");

        let state = h.store.state();
        assert!(state.tasks.is_empty());
        assert_eq!(state.pending_queue.len(), 1);
        assert!(state.pending_queue[0].creates(&task.id));
        assert_eq!(
            state.error.as_deref(),
            Some("network error: connection reset")
        );
    }

    #[tokio::test]
    async fn online_add_bad_request_is_not_queued() {
        let h = Harness::new(true).await;
        h.remote.fail_next(
            RemoteOp::Create,
            RemoteError::BadRequest {
                message: "content is too long".into(),
            },
        );

        h.store.add_task(draft("buy milk")).await.expect("add");

        let state = h.store.state();
        assert!(state.tasks.is_empty());
        assert!(state.pending_queue.is_empty());
        assert_eq!(state.error.as_deref(), Some("content is too long"));
    }

    #[tokio::test]
    async fn online_update_failure_rolls_back_and_queues_once() {
        let h = Harness::new(true).await;
        let original = h.seed("7", "old title");
        h.remote.fail_next(RemoteOp::Update, transport());

        let returned = h
            .store
            .update_task(&original.id, draft("new title"))
            .await
            .expect("update");

        assert_eq!(returned, original);
        assert_eq!(h.store.task(&original.id), Some(original.clone()));
        let state = h.store.state();
        assert_eq!(state.pending_queue.len(), 1);
        assert!(matches!(
            &state.pending_queue[0].action,
            Action::UpdateTask { id, draft } if id == &original.id && draft.title == "new title"
        ));
    }

    #[tokio::test]
    async fn online_update_of_missing_task_rolls_back_without_queueing() {
        let h = Harness::new(true).await;
        let local_only = server_task("9", "stale");
        h.store.with_state(|s| s.tasks.push(local_only.clone()));

        h.store
            .update_task(&local_only.id, draft("fresh"))
            .await
            .expect("update");

        let state = h.store.state();
        assert_eq!(state.tasks, vec![local_only]);
        assert!(state.pending_queue.is_empty());
        assert_eq!(state.error.as_deref(), Some("task not found with id: 9"));
    }

    #[tokio::test]
    async fn offline_update_applies_locally_and_queues() {
        let h = Harness::new(false).await;
        let original = h.seed("7", "old title");

        let updated = h
            .store
            .update_task(&original.id, draft("new title"))
            .await
            .expect("update");

        assert_eq!(updated.title, "new title");
        assert_eq!(h.store.task(&original.id), Some(updated));
        let queue = h.store.state().pending_queue;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].kind(), "update_task");
        assert_eq!(h.remote.task(&original.id).map(|t| t.title), Some("old title".into()));
    }

    #[tokio::test]
    async fn editing_an_unknown_task_is_an_error() {
        let h = Harness::new(true).await;
        let err = h
            .store
            .update_task(&TaskId::from("404"), draft("x"))
            .await
            .expect_err("unknown id");
        assert!(matches!(err, StoreError::TaskNotFound(_)));
        assert!(matches!(
            h.store.toggle_task(&TaskId::from("404")).await,
            Err(StoreError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn placeholder_edits_wait_behind_queued_create() {
        let h = Harness::new(true).await;
        h.store.set_online(false);
        let task = h.store.add_task(draft("draft")).await.expect("add");
        h.store.set_online(true);

        h.store
            .update_task(&task.id, draft("renamed"))
            .await
            .expect("update");
        h.store.toggle_task(&task.id).await.expect("toggle");

        let kinds: Vec<_> = h
            .store
            .state()
            .pending_queue
            .iter()
            .map(|a| a.kind())
            .collect();
        assert_eq!(kinds, ["create_task", "update_task", "toggle_task"]);
        let local = h.store.task(&task.id).expect("placeholder");
        assert_eq!(local.title, "renamed");
        assert!(local.completed);
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn placeholder_without_queued_create_ignores_edits() {
        let h = Harness::new(true).await;
        let in_flight = Task::provisional(&draft("sending"));
        h.store.with_state(|s| s.tasks.push(in_flight.clone()));

        let returned = h
            .store
            .update_task(&in_flight.id, draft("renamed"))
            .await
            .expect("update");
        h.store.toggle_task(&in_flight.id).await.expect("toggle");

        assert_eq!(returned, in_flight);
        let state = h.store.state();
        assert_eq!(state.tasks, vec![in_flight]);
        assert!(state.pending_queue.is_empty());
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn two_settled_toggles_restore_the_original_state() {
        let h = Harness::new(true).await;
        let task = h.seed("3", "walk the dog");

        h.store.toggle_task(&task.id).await.expect("toggle");
        assert!(h.store.task(&task.id).expect("task").completed);
        h.store.toggle_task(&task.id).await.expect("toggle");

        assert!(!h.store.task(&task.id).expect("task").completed);
        assert!(!h.remote.task(&task.id).expect("server copy").completed);
        assert_eq!(h.remote.count(RemoteOp::Toggle), 2);
    }

    #[tokio::test]
    async fn toggle_failure_restores_and_queues() {
        let h = Harness::new(true).await;
        let task = h.seed("3", "walk the dog");
        h.remote.fail_next(RemoteOp::Toggle, RemoteError::Timeout);

        h.store.toggle_task(&task.id).await.expect("toggle");

        let state = h.store.state();
        assert!(!state.tasks[0].completed);
        assert_eq!(state.pending_queue.len(), 1);
        assert_eq!(state.pending_queue[0].kind(), "toggle_task");
        assert_eq!(state.error.as_deref(), Some("request timed out"));
    }

    #[tokio::test]
    async fn completing_a_task_cancels_its_reminder() {
        let h = Harness::new(true).await;
        let remind_at = Utc::now() + Duration::hours(1);
        let task = h
            .store
            .add_task(draft("dentist").with_reminder_date(Some(remind_at)))
            .await
            .expect("add");

        h.store.toggle_task(&task.id).await.expect("toggle");

        let events = h.notifier.events();
        assert!(matches!(
            events.as_slice(),
            [NotifyEvent::Scheduled { id, .. }, NotifyEvent::Cancelled { id: cancelled }]
                if id == &task.id && cancelled == &task.id
        ));
    }

    #[tokio::test]
    async fn deleting_a_placeholder_unwinds_its_queue_entries() {
        let h = Harness::new(false).await;
        let keep = h.store.add_task(draft("keep")).await.expect("add");
        let drop = h.store.add_task(draft("drop")).await.expect("add");
        h.store.toggle_task(&drop.id).await.expect("toggle");

        h.store.delete_task(&drop.id).await;

        let state = h.store.state();
        assert_eq!(state.tasks, vec![keep.clone()]);
        assert_eq!(state.pending_queue.len(), 1);
        assert!(state.pending_queue[0].creates(&keep.id));
        assert!(state.pending_queue.iter().all(|a| a.target() != &drop.id));
    }

    #[tokio::test]
    async fn placeholder_deleted_during_online_create_is_removed_on_server() {
        let (h, gate) = Harness::gated(true).await;

        let (created, ()) = tokio::join!(h.store.add_task(draft("a")), async {
            tokio::task::yield_now().await;
            let temp = h.store.state().tasks[0].id.clone();
            h.store.delete_task(&temp).await;
            gate.notify_one();
        });

        let created = created.expect("add");
        assert_eq!(created.id, TaskId::from("srv-1"));
        assert!(h.remote.tasks().is_empty());
        let state = h.store.state();
        assert!(state.tasks.is_empty());
        assert!(state.pending_queue.is_empty());
        assert!(h.notifier.events().is_empty());

        h.store.fetch_tasks(true).await;
        assert!(h.store.state().tasks.is_empty());
    }

    #[tokio::test]
    async fn server_copy_of_deleted_placeholder_is_queued_for_deletion_on_failure() {
        let (h, gate) = Harness::gated(true).await;
        h.remote.fail_next(RemoteOp::Delete, transport());

        let (created, ()) = tokio::join!(h.store.add_task(draft("a")), async {
            tokio::task::yield_now().await;
            let temp = h.store.state().tasks[0].id.clone();
            h.store.delete_task(&temp).await;
            gate.notify_one();
        });

        let real = created.expect("add").id;
        let state = h.store.state();
        assert!(state.tasks.is_empty());
        assert_eq!(state.pending_queue.len(), 1);
        assert_eq!(state.pending_queue[0].kind(), "delete_task");
        assert_eq!(state.pending_queue[0].target(), &real);

        h.store.process_queue().await;
        assert!(h.remote.tasks().is_empty());
        assert!(h.store.state().tasks.is_empty());
    }

    #[tokio::test]
    async fn failed_create_of_deleted_placeholder_is_not_requeued() {
        let (h, gate) = Harness::gated(true).await;
        h.remote.fail_next(RemoteOp::Create, transport());

        let (_, ()) = tokio::join!(h.store.add_task(draft("a")), async {
            tokio::task::yield_now().await;
            let temp = h.store.state().tasks[0].id.clone();
            h.store.delete_task(&temp).await;
            gate.notify_one();
        });

        let state = h.store.state();
        assert!(state.tasks.is_empty());
        assert!(state.pending_queue.is_empty());
        assert!(state.error.is_none());

        h.store.set_online(false);
        h.store.on_connectivity_change(true).await;
        assert!(h.remote.tasks().is_empty());
        assert_eq!(h.remote.count(RemoteOp::Create), 1);
    }

    #[tokio::test]
    async fn delete_failure_restores_the_list() {
        let h = Harness::new(true).await;
        let first = h.seed("1", "first");
        let second = h.seed("2", "second");
        h.remote.fail_next(RemoteOp::Delete, transport());

        h.store.delete_task(&first.id).await;

        let state = h.store.state();
        assert_eq!(state.tasks, vec![first.clone(), second]);
        assert_eq!(state.pending_queue.len(), 1);
        assert_eq!(state.pending_queue[0].target(), &first.id);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn delete_of_task_already_gone_counts_as_done() {
        let h = Harness::new(true).await;
        let local_only = server_task("9", "stale");
        h.store.with_state(|s| s.tasks.push(local_only.clone()));

        h.store.delete_task(&local_only.id).await;

        let state = h.store.state();
        assert!(state.tasks.is_empty());
        assert!(state.pending_queue.is_empty());
        assert!(state.error.is_none());
        assert_eq!(
            h.notifier.events(),
            vec![NotifyEvent::Cancelled { id: local_only.id }]
        );
    }

    #[tokio::test]
    async fn fetch_keeps_unconfirmed_placeholders_on_top() {
        let h = Harness::new(false).await;
        let placeholder = h.store.add_task(draft("queued")).await.expect("add");
        h.remote.insert(server_task("1", "from server"));
        h.store.set_online(true);

        h.store.fetch_tasks(false).await;

        let state = h.store.state();
        let ids: Vec<_> = state.tasks.iter().map(|t| t.id.as_str().to_string()).collect();
        assert_eq!(ids, [placeholder.id.as_str(), "1"]);
        assert!(!state.has_more);
        assert!(state.error.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_local_tasks_with_offline_notice() {
        let h = Harness::new(true).await;
        let task = h.seed("1", "cached");
        h.remote.set_unreachable(true);

        h.store.fetch_tasks(true).await;

        let state = h.store.state();
        assert_eq!(state.tasks, vec![task]);
        assert_eq!(state.error.as_deref(), Some(OFFLINE_NOTICE));
        assert!(!state.refreshing);
    }

    #[tokio::test]
    async fn load_more_appends_until_the_last_page() {
        let h = Harness::new(true).await;
        for n in 0..25 {
            h.remote.insert(server_task(&format!("{n}"), &format!("task {n}")));
        }

        h.store.fetch_tasks(false).await;
        assert_eq!(h.store.state().tasks.len(), 20);
        assert!(h.store.state().has_more);

        h.store.load_more_tasks().await;
        let state = h.store.state();
        assert_eq!(state.tasks.len(), 25);
        assert_eq!(state.current_page, 1);
        assert!(!state.has_more);

        h.store.load_more_tasks().await;
        assert_eq!(h.remote.count(RemoteOp::List), 2);
    }

    #[tokio::test]
    async fn search_trims_the_query_and_pages_through_matches() {
        let h = Harness::new(true).await;
        for n in 0..22 {
            h.remote.insert(server_task(&format!("m{n}"), &format!("milk {n}")));
        }
        h.remote.insert(server_task("b", "bread"));

        h.store.search_tasks("  milk ").await;
        let state = h.store.state();
        assert_eq!(state.search_query, "milk");
        assert_eq!(state.tasks.len(), 20);

        h.store.load_more_tasks().await;
        assert_eq!(h.store.state().tasks.len(), 22);
        assert_eq!(
            h.remote.calls().last(),
            Some(&RemoteCall::Search {
                query: "milk".into(),
                page: 1
            })
        );
    }

    #[tokio::test]
    async fn search_keeps_unconfirmed_placeholders_editable() {
        let h = Harness::new(false).await;
        let placeholder = h.store.add_task(draft("queued milk")).await.expect("add");
        h.remote.insert(server_task("1", "milk"));
        h.store.set_online(true);

        h.store.search_tasks("milk").await;

        let ids: Vec<_> = h.store.state().tasks.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![placeholder.id.clone(), TaskId::from("1")]);
        h.store
            .update_task(&placeholder.id, draft("queued oat milk"))
            .await
            .expect("placeholder still editable");
        h.store.toggle_task(&placeholder.id).await.expect("toggle");
    }

    #[tokio::test]
    async fn blank_search_falls_back_to_the_list() {
        let h = Harness::new(true).await;
        h.remote.insert(server_task("1", "anything"));

        h.store.search_tasks("   ").await;

        assert_eq!(h.remote.calls(), vec![RemoteCall::List { page: 0 }]);
        assert_eq!(h.store.state().tasks.len(), 1);
    }

    #[tokio::test]
    async fn failed_search_reports_and_keeps_tasks() {
        let h = Harness::new(true).await;
        let task = h.seed("1", "cached");
        h.remote.fail_next(RemoteOp::Search, transport());

        h.store.search_tasks("cache").await;

        let state = h.store.state();
        assert_eq!(state.error.as_deref(), Some(SEARCH_FAILED));
        assert_eq!(state.tasks, vec![task]);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn queue_and_tasks_survive_a_restart() {
        let h = Harness::new(false).await;
        h.store.add_task(draft("offline one")).await.expect("add");
        let before = h.store.state();

        let reopened = h.reopen(false).await;

        let after = reopened.state();
        assert_eq!(after.tasks, before.tasks);
        assert_eq!(after.pending_queue, before.pending_queue);
    }

    #[tokio::test]
    async fn only_offline_to_online_is_a_transition() {
        let h = Harness::new(false).await;
        assert!(!h.store.set_online(false));
        assert!(h.store.set_online(true));
        assert!(!h.store.set_online(true));
        assert!(!h.store.set_online(false));
    }

    #[tokio::test]
    async fn reconnect_drains_exactly_once() {
        let h = Harness::new(false).await;
        h.store.add_task(draft("queued")).await.expect("add");

        h.store.on_connectivity_change(true).await;
        h.store.on_connectivity_change(true).await;

        assert_eq!(h.remote.count(RemoteOp::Create), 1);
        assert!(h.store.state().pending_queue.is_empty());
    }

    #[tokio::test]
    async fn clear_error_empties_the_slot() {
        let h = Harness::new(true).await;
        let _ = h.store.add_task(TaskDraft::new("t", " ")).await;
        assert_eq!(h.store.state().error.as_deref(), Some("content is required"));

        h.store.clear_error();
        assert!(h.store.state().error.is_none());
    }
}
