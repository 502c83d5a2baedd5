use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::task::{Task, TaskId};

/// Reminders closer than this to "now" are not scheduled.
pub const MIN_REMINDER_LEAD_SECS: i64 = 30;

/// When a reminder for `task` should fire, if it should fire at all: the task
/// needs a reminder date, must still be open, and the date must be at least
/// [`MIN_REMINDER_LEAD_SECS`] ahead of `now`.
pub fn reminder_trigger(task: &Task, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if task.completed {
        return None;
    }
    let at = task.reminder_date?;
    (at - now >= Duration::seconds(MIN_REMINDER_LEAD_SECS)).then_some(at)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification backend failure: {0}")]
    Backend(String),
}

/// Local reminder scheduling. Implementations must treat tasks that
/// [`reminder_trigger`] rejects as a successful no-op.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn schedule(&self, task: &Task) -> Result<(), NotifyError>;

    async fn cancel(&self, id: &TaskId) -> Result<(), NotifyError>;

    async fn cancel_all(&self) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    Scheduled { id: TaskId, at: DateTime<Utc> },
    Cancelled { id: TaskId },
    CancelledAll,
}

/// Captures scheduling requests instead of firing them. Useful in tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotifyEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn record(&self, event: NotifyEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|err| NotifyError::Backend(format!("lock poisoned: {err}")))?
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn schedule(&self, task: &Task) -> Result<(), NotifyError> {
        match reminder_trigger(task, Utc::now()) {
            Some(at) => self.record(NotifyEvent::Scheduled {
                id: task.id.clone(),
                at,
            }),
            None => Ok(()),
        }
    }

    async fn cancel(&self, id: &TaskId) -> Result<(), NotifyError> {
        self.record(NotifyEvent::Cancelled { id: id.clone() })
    }

    async fn cancel_all(&self) -> Result<(), NotifyError> {
        self.record(NotifyEvent::CancelledAll)
    }
}
