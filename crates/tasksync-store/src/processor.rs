//! Queue replay.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use tasksync_core::{remote::RemoteError, Task, TaskId};
use tracing::{debug, info, instrument, warn};

use crate::{
    queue::{has_pending_create, Action, PendingAction},
    store::{replace_by_id, TaskStore},
};

/// Counts from one replay pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions the server accepted.
    pub replayed: usize,
    /// Actions rejected for good and rolled back locally.
    pub dropped: usize,
    /// Actions left for the next pass.
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing was queued.
    Idle,
    /// Another pass was already running; this trigger folded into it.
    AlreadyRunning,
    Drained(DrainReport),
}

enum ReplayFailure {
    /// Can never succeed as queued.
    Rejected(RemoteError),
    /// Targets a placeholder whose creation did not go through.
    Orphaned,
    /// Worth retrying; stops the pass.
    Halt(RemoteError),
}

impl ReplayFailure {
    fn classify(err: RemoteError, not_found_is_final: bool) -> Self {
        if err.is_transient() || (err.is_not_found() && !not_found_is_final) {
            ReplayFailure::Halt(err)
        } else {
            ReplayFailure::Rejected(err)
        }
    }
}

/// Clears the in-flight flag however the pass ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Real id for `id`, following placeholders confirmed earlier in this pass.
fn resolve(id: &TaskId, confirmed: &HashMap<TaskId, Task>) -> Result<TaskId, ReplayFailure> {
    if !id.is_temporary() {
        return Ok(id.clone());
    }
    confirmed
        .get(id)
        .map(|task| task.id.clone())
        .ok_or(ReplayFailure::Orphaned)
}

impl TaskStore {
    /// Replay the pending queue in order.
    ///
    /// Rejected actions are dropped and rolled back; the first retryable
    /// failure stops the pass and keeps that action and everything after it.
    /// Overlapping calls return [`DrainOutcome::AlreadyRunning`] without
    /// touching the queue.
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> DrainOutcome {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("replay already in flight");
            return DrainOutcome::AlreadyRunning;
        }
        let _guard = DrainGuard(&self.draining);

        let queue = self.with_state(|s| s.pending_queue.clone());
        if queue.is_empty() {
            return DrainOutcome::Idle;
        }
        info!(pending = queue.len(), "replaying pending actions");
        self.with_state(|s| s.loading = true);

        let mut report = DrainReport::default();
        let mut remaining: Vec<PendingAction> = Vec::new();
        let mut confirmed: HashMap<TaskId, Task> = HashMap::new();
        let mut halted = false;

        for pending in &queue {
            if halted {
                remaining.push(pending.clone());
                continue;
            }
            match self.replay(pending, &mut confirmed).await {
                Ok(()) => report.replayed += 1,
                Err(ReplayFailure::Rejected(err)) => {
                    warn!(kind = pending.kind(), task = %pending.target(), error = %err, "server rejected queued action, dropping");
                    self.with_state(|s| pending.undo.revert(&mut s.tasks));
                    report.dropped += 1;
                }
                Err(ReplayFailure::Orphaned) => {
                    warn!(kind = pending.kind(), task = %pending.target(), "queued action targets an unconfirmed task, dropping");
                    self.with_state(|s| pending.undo.revert(&mut s.tasks));
                    report.dropped += 1;
                }
                Err(ReplayFailure::Halt(err)) => {
                    warn!(kind = pending.kind(), task = %pending.target(), error = %err, "replay interrupted");
                    remaining.push(pending.clone());
                    halted = true;
                }
            }
        }

        let (left, online) = self.with_state(|s| {
            let processed: HashSet<&str> = queue.iter().map(|a| a.id.as_str()).collect();
            let mut next = remaining;
            // Work queued while the pass was running goes behind what is left.
            next.extend(
                s.pending_queue
                    .iter()
                    .filter(|a| !processed.contains(a.id.as_str()))
                    .cloned(),
            );

            for (temp_id, task) in &confirmed {
                let still_targeted = next.iter().any(|a| a.target() == temp_id);
                let position = s.tasks.iter().position(|t| &t.id == temp_id);
                if let Some(index) = position {
                    if still_targeted {
                        // Keep the local edits that are still on their way.
                        s.tasks[index].id = task.id.clone();
                    } else {
                        s.tasks[index] = task.clone();
                    }
                } else if !has_pending_create(&s.pending_queue, temp_id) {
                    // Deleted locally while its creation was in flight.
                    next.push(PendingAction::delete(task.clone(), 0));
                }
                for action in next.iter_mut() {
                    action.rebind(temp_id, &task.id);
                }
            }

            s.pending_queue = next;
            s.loading = false;
            (s.pending_queue.len(), s.is_online)
        });
        report.remaining = left;
        self.persist().await;
        info!(
            replayed = report.replayed,
            dropped = report.dropped,
            remaining = report.remaining,
            "replay finished"
        );

        if left == 0 && online {
            if let Err(err) = self.load_first_page(true).await {
                debug!(error = %err, "post-replay refresh failed");
            }
        }
        DrainOutcome::Drained(report)
    }

    async fn replay(
        &self,
        pending: &PendingAction,
        confirmed: &mut HashMap<TaskId, Task>,
    ) -> Result<(), ReplayFailure> {
        match &pending.action {
            Action::CreateTask { temp_id, draft } => {
                let task = self
                    .remote
                    .create(draft)
                    .await
                    .map_err(|e| ReplayFailure::classify(e, false))?;
                self.schedule_reminder(&task).await;
                confirmed.insert(temp_id.clone(), task);
            }
            Action::UpdateTask { id, draft } => {
                let target = resolve(id, confirmed)?;
                let task = self
                    .remote
                    .update(&target, draft)
                    .await
                    .map_err(|e| ReplayFailure::classify(e, true))?;
                self.cancel_reminder(&target).await;
                self.schedule_reminder(&task).await;
                if id.is_temporary() {
                    confirmed.insert(id.clone(), task);
                } else {
                    self.with_state(|s| replace_by_id(&mut s.tasks, &target, task));
                }
            }
            Action::ToggleTask { id } => {
                let target = resolve(id, confirmed)?;
                self.remote
                    .toggle(&target)
                    .await
                    .map_err(|e| ReplayFailure::classify(e, true))?;
                if let Some(task) = confirmed.get_mut(id) {
                    task.completed = !task.completed;
                }
                let local = self.with_state(|s| s.tasks.iter().find(|t| &t.id == id).cloned());
                if let Some(task) = local {
                    if task.completed && task.reminder_date.is_some() {
                        self.cancel_reminder(&target).await;
                    }
                }
            }
            Action::DeleteTask { id } => {
                let target = resolve(id, confirmed)?;
                match self.remote.delete(&target).await {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => debug!(%target, "already deleted"),
                    Err(err) => return Err(ReplayFailure::classify(err, false)),
                }
                self.cancel_reminder(&target).await;
            }
        }
        Ok(())
    }
}
