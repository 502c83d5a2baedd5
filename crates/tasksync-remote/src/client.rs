use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use tasksync_core::{
    remote::{RemoteError, RemoteTaskService},
    Task, TaskDraft, TaskId, TaskPage,
};
use tracing::{debug, instrument};

use crate::dto::{ErrorBody, PageQuery, TaskDto, TaskPageDto, TaskRequest};

/// Mount point of the task resource below the server base URL.
pub const TASKS_PATH: &str = "/api/tasks";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("tasksync/", env!("CARGO_PKG_VERSION"));

/// [`RemoteTaskService`] over the backend's REST API.
pub struct HttpTaskService {
    client: reqwest::Client,
    base: String,
}

impl HttpTaskService {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout)?,
            base: tasks_url(base_url),
        })
    }

    /// Full URL of the task collection.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn task_url(&self, id: &TaskId) -> String {
        self.url(&format!("/{id}"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), %body, "request rejected");
        Err(status_error(status.as_u16(), &body))
    }

    async fn page(&self, request: RequestBuilder) -> Result<TaskPage, RemoteError> {
        let response = self.send(request).await?;
        let page: TaskPageDto = response.json().await.map_err(transport_error)?;
        Ok(page.into())
    }

    async fn task(&self, request: RequestBuilder) -> Result<Task, RemoteError> {
        let response = self.send(request).await?;
        let task: TaskDto = response.json().await.map_err(transport_error)?;
        Ok(task.into())
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, RemoteError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RemoteError::Transport(e.to_string()))
}

pub(crate) fn tasks_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with(TASKS_PATH) {
        base.to_string()
    } else {
        format!("{base}{TASKS_PATH}")
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(err.to_string())
    }
}

/// Classify a non-success response. The server's own message wins so it can
/// be shown to the user as is.
fn status_error(status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| format!("request failed with status {status}"));
    match status {
        400 => RemoteError::BadRequest { message },
        404 => RemoteError::NotFound { message },
        _ => RemoteError::Server { status, message },
    }
}

#[async_trait]
impl RemoteTaskService for HttpTaskService {
    #[instrument(skip(self))]
    async fn list(&self, page: u32, size: u32) -> Result<TaskPage, RemoteError> {
        let query = PageQuery {
            q: None,
            page,
            size,
        };
        self.page(self.client.get(&self.base).query(&query)).await
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, page: u32, size: u32) -> Result<TaskPage, RemoteError> {
        let query = PageQuery {
            q: Some(query),
            page,
            size,
        };
        self.page(self.client.get(self.url("/search")).query(&query))
            .await
    }

    #[instrument(skip_all, fields(title = %draft.title))]
    async fn create(&self, draft: &TaskDraft) -> Result<Task, RemoteError> {
        self.task(self.client.post(&self.base).json(&TaskRequest::from(draft)))
            .await
    }

    #[instrument(skip_all, fields(%id))]
    async fn update(&self, id: &TaskId, draft: &TaskDraft) -> Result<Task, RemoteError> {
        self.task(
            self.client
                .put(self.task_url(id))
                .json(&TaskRequest::from(draft)),
        )
        .await
    }

    #[instrument(skip_all, fields(%id))]
    async fn toggle(&self, id: &TaskId) -> Result<(), RemoteError> {
        self.send(self.client.patch(self.url(&format!("/{id}/toggle"))))
            .await
            .map(|_| ())
    }

    #[instrument(skip_all, fields(%id))]
    async fn delete(&self, id: &TaskId) -> Result<(), RemoteError> {
        self.send(self.client.delete(self.task_url(id)))
            .await
            .map(|_| ())
    }
}
