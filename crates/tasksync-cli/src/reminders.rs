use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use tasksync_core::{
    notify::{reminder_trigger, Notifier, NotifyError},
    Task, TaskId,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Fires reminders from in-process timers, one per task. Only useful while
/// the process stays up (`watch`); short-lived commands drop them on exit.
#[derive(Debug, Default, Clone)]
pub struct TimerNotifier {
    timers: Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>,
}

impl TimerNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<TaskId, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Timers that have not fired yet.
    pub fn pending(&self) -> usize {
        let mut timers = self.timers();
        timers.retain(|_, handle| !handle.is_finished());
        timers.len()
    }
}

#[async_trait]
impl Notifier for TimerNotifier {
    async fn schedule(&self, task: &Task) -> Result<(), NotifyError> {
        let now = Utc::now();
        let Some(at) = reminder_trigger(task, now) else {
            debug!(id = %task.id, "no reminder to schedule");
            return Ok(());
        };
        let delay = (at - now)
            .to_std()
            .map_err(|e| NotifyError::Backend(e.to_string()))?;
        let title = task.title.clone();
        let content = task.content.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            println!("Reminder: {title}\n    {content}");
        });
        info!(id = %task.id, %at, "reminder scheduled");
        if let Some(previous) = self.timers().insert(task.id.clone(), handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn cancel(&self, id: &TaskId) -> Result<(), NotifyError> {
        if let Some(handle) = self.timers().remove(id) {
            handle.abort();
            debug!(%id, "reminder cancelled");
        }
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), NotifyError> {
        for (_, handle) in self.timers().drain() {
            handle.abort();
        }
        Ok(())
    }
}
