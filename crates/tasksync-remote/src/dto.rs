//! Wire shapes of the task backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasksync_core::{timestamp, Task, TaskDraft, TaskId, TaskPage};

/// Some deployments number their tasks, others use string keys.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireId> for TaskId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(id) => TaskId::new(id),
            WireId::Number(id) => TaskId::new(id.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskDto {
    id: WireId,
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    completed: bool,
    #[serde(with = "timestamp::wire")]
    created_at: DateTime<Utc>,
    #[serde(with = "timestamp::wire")]
    updated_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::wire_option")]
    due_date: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::wire_option")]
    reminder_date: Option<DateTime<Utc>>,
}

impl From<TaskDto> for Task {
    fn from(dto: TaskDto) -> Self {
        Task {
            id: dto.id.into(),
            title: dto.title,
            content: dto.content,
            completed: dto.completed,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
            due_date: dto.due_date,
            reminder_date: dto.reminder_date,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskPageDto {
    #[serde(default)]
    content: Vec<TaskDto>,
    #[serde(default)]
    page_number: u32,
    #[serde(default)]
    page_size: u32,
    #[serde(default)]
    total_elements: u64,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    last: bool,
}

impl From<TaskPageDto> for TaskPage {
    fn from(dto: TaskPageDto) -> Self {
        TaskPage {
            content: dto.content.into_iter().map(Task::from).collect(),
            page_number: dto.page_number,
            page_size: dto.page_size,
            total_elements: dto.total_elements,
            total_pages: dto.total_pages,
            last: dto.last,
        }
    }
}

/// Body of create and update. Absent dates go out as `null` so an update
/// clears them.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TaskRequest<'a> {
    title: &'a str,
    content: &'a str,
    #[serde(with = "timestamp::wire_option")]
    due_date: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::wire_option")]
    reminder_date: Option<DateTime<Utc>>,
}

impl<'a> From<&'a TaskDraft> for TaskRequest<'a> {
    fn from(draft: &'a TaskDraft) -> Self {
        Self {
            title: &draft.title,
            content: &draft.content,
            due_date: draft.due_date,
            reminder_date: draft.reminder_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PageQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<&'a str>,
    pub page: u32,
    pub size: u32,
}

/// Error payloads: problem-details `detail`, or the framework's `message`
/// and `error` fields.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    detail: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        [self.detail, self.message, self.error]
            .into_iter()
            .flatten()
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty())
    }
}
