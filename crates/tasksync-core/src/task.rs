use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Task identifier. Either server-assigned or a client placeholder (`temp_…`)
/// for a task whose creation the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub const TEMP_PREFIX: &'static str = "temp_";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh placeholder id: creation time in millis plus a random suffix so two
    /// tasks added within the same millisecond never collide.
    pub fn temporary() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}{}_{}",
            Self::TEMP_PREFIX,
            Utc::now().timestamp_millis(),
            &suffix[..8]
        ))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(Self::TEMP_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Task entity as held by the store and persisted in snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub content: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Optimistic local task for a draft that has not reached the server.
    pub fn provisional(draft: &TaskDraft) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::temporary(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            completed: false,
            created_at: now,
            updated_at: now,
            due_date: draft.due_date,
            reminder_date: draft.reminder_date,
        }
    }

    /// Overwrite the user-editable fields and bump `updated_at`.
    pub fn apply_draft(&mut self, draft: &TaskDraft) {
        self.title = draft.title.clone();
        self.content = draft.content.clone();
        self.due_date = draft.due_date;
        self.reminder_date = draft.reminder_date;
        self.updated_at = Utc::now();
    }
}

/// Blank-field rejection raised before anything touches state or the network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title is required")]
    BlankTitle,
    #[error("content is required")]
    BlankContent,
}

/// User-editable fields sent on create and update.
///
/// Updates replace the whole field set on the server, so `None` dates in a draft
/// sent to `update` clear the stored value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            due_date: None,
            reminder_date: None,
        }
    }

    pub fn with_due_date(mut self, due_date: Option<DateTime<Utc>>) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn with_reminder_date(mut self, reminder_date: Option<DateTime<Utc>>) -> Self {
        self.reminder_date = reminder_date;
        self
    }

    /// Trim title and content, rejecting either when blank.
    pub fn validated(self) -> Result<Self, ValidationError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::BlankTitle);
        }
        let content = self.content.trim().to_string();
        if content.is_empty() {
            return Err(ValidationError::BlankContent);
        }
        Ok(Self {
            title,
            content,
            ..self
        })
    }
}

/// One page of a list or search response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub content: Vec<Task>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub last: bool,
}
