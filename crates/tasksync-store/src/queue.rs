//! Pending-action log entries and the undo descriptors that invert their
//! optimistic effect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasksync_core::{Task, TaskDraft, TaskId};
use uuid::Uuid;

/// Mutation that still has to reach the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
    CreateTask { temp_id: TaskId, draft: TaskDraft },
    UpdateTask { id: TaskId, draft: TaskDraft },
    ToggleTask { id: TaskId },
    DeleteTask { id: TaskId },
}

impl Action {
    /// Task the action operates on. For creations this is the placeholder id.
    pub fn target(&self) -> &TaskId {
        match self {
            Action::CreateTask { temp_id, .. } => temp_id,
            Action::UpdateTask { id, .. } | Action::ToggleTask { id } | Action::DeleteTask { id } => {
                id
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::CreateTask { .. } => "create_task",
            Action::UpdateTask { .. } => "update_task",
            Action::ToggleTask { .. } => "toggle_task",
            Action::DeleteTask { .. } => "delete_task",
        }
    }
}

/// Prior state needed to invert one optimistic mutation, one variant per action
/// type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Undo {
    /// Drop the placeholder task.
    CreateTask { temp_id: TaskId },
    /// Put the pre-edit copy back.
    UpdateTask { previous: Task },
    ToggleTask { id: TaskId, previous_completed: bool },
    /// Put the removed task back where it was, unless it is already there.
    DeleteTask { task: Task, index: usize },
}

impl Undo {
    pub fn revert(&self, tasks: &mut Vec<Task>) {
        match self {
            Undo::CreateTask { temp_id } => tasks.retain(|t| &t.id != temp_id),
            Undo::UpdateTask { previous } => {
                if let Some(task) = tasks.iter_mut().find(|t| t.id == previous.id) {
                    *task = previous.clone();
                }
            }
            Undo::ToggleTask {
                id,
                previous_completed,
            } => {
                if let Some(task) = tasks.iter_mut().find(|t| &t.id == id) {
                    task.completed = *previous_completed;
                }
            }
            Undo::DeleteTask { task, index } => {
                if tasks.iter().all(|t| t.id != task.id) {
                    tasks.insert((*index).min(tasks.len()), task.clone());
                }
            }
        }
    }

    fn rebind(&mut self, from: &TaskId, to: &TaskId) {
        match self {
            Undo::CreateTask { .. } => {}
            Undo::UpdateTask { previous } => rebind_task(previous, from, to),
            Undo::ToggleTask { id, .. } => rebind_id(id, from, to),
            Undo::DeleteTask { task, .. } => rebind_task(task, from, to),
        }
    }
}

fn rebind_id(id: &mut TaskId, from: &TaskId, to: &TaskId) {
    if id == from {
        *id = to.clone();
    }
}

fn rebind_task(task: &mut Task, from: &TaskId, to: &TaskId) {
    rebind_id(&mut task.id, from, to);
}

/// Durable queue entry: the replay payload plus its undo descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    /// Queue-local identity, unrelated to the task id.
    pub id: String,
    pub enqueued_at: DateTime<Utc>,
    pub action: Action,
    pub undo: Undo,
}

impl PendingAction {
    fn new(action: Action, undo: Undo) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            enqueued_at: Utc::now(),
            action,
            undo,
        }
    }

    pub fn create(temp_id: TaskId, draft: TaskDraft) -> Self {
        Self::new(
            Action::CreateTask {
                temp_id: temp_id.clone(),
                draft,
            },
            Undo::CreateTask { temp_id },
        )
    }

    pub fn update(previous: Task, draft: TaskDraft) -> Self {
        Self::new(
            Action::UpdateTask {
                id: previous.id.clone(),
                draft,
            },
            Undo::UpdateTask { previous },
        )
    }

    pub fn toggle(id: TaskId, previous_completed: bool) -> Self {
        Self::new(
            Action::ToggleTask { id: id.clone() },
            Undo::ToggleTask {
                id,
                previous_completed,
            },
        )
    }

    /// `index` is the position `task` held in the local list.
    pub fn delete(task: Task, index: usize) -> Self {
        Self::new(
            Action::DeleteTask {
                id: task.id.clone(),
            },
            Undo::DeleteTask { task, index },
        )
    }

    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }

    pub fn target(&self) -> &TaskId {
        self.action.target()
    }

    /// Whether this is the creation of `temp_id`.
    pub fn creates(&self, temp_id: &TaskId) -> bool {
        matches!(&self.action, Action::CreateTask { temp_id: id, .. } if id == temp_id)
    }

    /// Point a non-creation action (and its undo) at `to` instead of `from`,
    /// once the server has assigned a real id to a placeholder.
    pub fn rebind(&mut self, from: &TaskId, to: &TaskId) {
        match &mut self.action {
            Action::CreateTask { .. } => return,
            Action::UpdateTask { id, .. } | Action::ToggleTask { id } | Action::DeleteTask { id } => {
                rebind_id(id, from, to)
            }
        }
        self.undo.rebind(from, to);
    }
}

/// Whether `queue` still holds the creation of `temp_id`.
pub fn has_pending_create(queue: &[PendingAction], temp_id: &TaskId) -> bool {
    queue.iter().any(|action| action.creates(temp_id))
}
