use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::task::{Task, TaskDraft, TaskId, TaskPage};

/// Failure of a remote task call, classified the way the sync engine needs it.
///
/// The `Display` text is what ends up in the user-visible error slot, so the
/// rejection variants carry the server-provided message verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// 400: the request can never succeed as sent.
    #[error("{message}")]
    BadRequest { message: String },
    /// 404: the target resource is gone.
    #[error("{message}")]
    NotFound { message: String },
    /// Any other non-success status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    /// Connection refused, DNS failure, broken body and the like.
    #[error("network error: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn is_bad_request(&self) -> bool {
        matches!(self, RemoteError::BadRequest { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    /// Worth retrying later: nothing about the request itself was rejected.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Server { .. } | RemoteError::Timeout | RemoteError::Transport(_)
        )
    }
}

/// Contract of the backend task service as consumed by the sync engine.
#[async_trait]
pub trait RemoteTaskService: Send + Sync {
    /// Page through all tasks, newest first.
    async fn list(&self, page: u32, size: u32) -> Result<TaskPage, RemoteError>;

    /// Page through tasks whose title or content matches `query`.
    async fn search(&self, query: &str, page: u32, size: u32) -> Result<TaskPage, RemoteError>;

    async fn create(&self, draft: &TaskDraft) -> Result<Task, RemoteError>;

    async fn update(&self, id: &TaskId, draft: &TaskDraft) -> Result<Task, RemoteError>;

    /// Flip `completed`. Any response body is ignored.
    async fn toggle(&self, id: &TaskId) -> Result<(), RemoteError>;

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError>;
}

/// Operation selector for scripted failures on [`MockTaskService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    List,
    Search,
    Create,
    Update,
    Toggle,
    Delete,
}

/// Call captured by [`MockTaskService`], in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    List { page: u32 },
    Search { query: String, page: u32 },
    Create { title: String },
    Update { id: TaskId, title: String },
    Toggle { id: TaskId },
    Delete { id: TaskId },
}

/// In-memory backend for tests and offline demos.
///
/// Behaves like the real service (server ids, 400 on blank fields, 404 on
/// unknown ids) and lets tests script failures and inspect the calls made.
#[derive(Debug, Default, Clone)]
pub struct MockTaskService {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Debug, Default)]
struct MockInner {
    tasks: Vec<Task>,
    next_id: u64,
    calls: Vec<RemoteCall>,
    scripted: HashMap<RemoteOp, VecDeque<RemoteError>>,
    unreachable: bool,
}

impl MockTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a server-side task, returned first by `list`.
    pub fn insert(&self, task: Task) {
        self.lock().tasks.insert(0, task);
    }

    /// Server-side copy of a task.
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.lock().tasks.iter().find(|t| &t.id == id).cloned()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Number of captured calls of one kind.
    pub fn count(&self, op: RemoteOp) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call_op(call) == op)
            .count()
    }

    /// Fail the next call of `op` with `error`. Repeated calls stack up in order.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.lock().scripted.entry(op).or_default().push_back(error);
    }

    /// While unreachable every call fails with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    fn begin(&self, call: RemoteCall) -> Result<MutexGuard<'_, MockInner>, RemoteError> {
        let op = call_op(&call);
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.unreachable {
            return Err(RemoteError::Transport("connection refused".to_string()));
        }
        if let Some(error) = inner.scripted.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(inner)
    }
}

fn call_op(call: &RemoteCall) -> RemoteOp {
    match call {
        RemoteCall::List { .. } => RemoteOp::List,
        RemoteCall::Search { .. } => RemoteOp::Search,
        RemoteCall::Create { .. } => RemoteOp::Create,
        RemoteCall::Update { .. } => RemoteOp::Update,
        RemoteCall::Toggle { .. } => RemoteOp::Toggle,
        RemoteCall::Delete { .. } => RemoteOp::Delete,
    }
}

fn paginate(matching: Vec<Task>, page: u32, size: u32) -> TaskPage {
    let size = size.max(1);
    let total_elements = matching.len() as u64;
    let total_pages = matching.len().div_ceil(size as usize) as u32;
    let content = matching
        .into_iter()
        .skip(page as usize * size as usize)
        .take(size as usize)
        .collect();
    TaskPage {
        content,
        page_number: page,
        page_size: size,
        total_elements,
        total_pages,
        last: page + 1 >= total_pages,
    }
}

fn not_found(id: &TaskId) -> RemoteError {
    RemoteError::NotFound {
        message: format!("task not found with id: {id}"),
    }
}

#[async_trait]
impl RemoteTaskService for MockTaskService {
    async fn list(&self, page: u32, size: u32) -> Result<TaskPage, RemoteError> {
        let inner = self.begin(RemoteCall::List { page })?;
        Ok(paginate(inner.tasks.clone(), page, size))
    }

    async fn search(&self, query: &str, page: u32, size: u32) -> Result<TaskPage, RemoteError> {
        let inner = self.begin(RemoteCall::Search {
            query: query.to_string(),
            page,
        })?;
        let needle = query.trim().to_lowercase();
        let matching = inner
            .tasks
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        Ok(paginate(matching, page, size))
    }

    async fn create(&self, draft: &TaskDraft) -> Result<Task, RemoteError> {
        let mut inner = self.begin(RemoteCall::Create {
            title: draft.title.clone(),
        })?;
        let draft = draft
            .clone()
            .validated()
            .map_err(|e| RemoteError::BadRequest {
                message: e.to_string(),
            })?;
        inner.next_id += 1;
        let now = Utc::now();
        let task = Task {
            id: TaskId::new(format!("srv-{}", inner.next_id)),
            title: draft.title,
            content: draft.content,
            completed: false,
            created_at: now,
            updated_at: now,
            due_date: draft.due_date,
            reminder_date: draft.reminder_date,
        };
        inner.tasks.insert(0, task.clone());
        Ok(task)
    }

    async fn update(&self, id: &TaskId, draft: &TaskDraft) -> Result<Task, RemoteError> {
        let mut inner = self.begin(RemoteCall::Update {
            id: id.clone(),
            title: draft.title.clone(),
        })?;
        let draft = draft
            .clone()
            .validated()
            .map_err(|e| RemoteError::BadRequest {
                message: e.to_string(),
            })?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| not_found(id))?;
        task.apply_draft(&draft);
        Ok(task.clone())
    }

    async fn toggle(&self, id: &TaskId) -> Result<(), RemoteError> {
        let mut inner = self.begin(RemoteCall::Toggle { id: id.clone() })?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| not_found(id))?;
        task.completed = !task.completed;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        let mut inner = self.begin(RemoteCall::Delete { id: id.clone() })?;
        let before = inner.tasks.len();
        inner.tasks.retain(|t| &t.id != id);
        if inner.tasks.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }
}
