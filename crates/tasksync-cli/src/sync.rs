use std::{sync::Arc, time::Duration};

use color_eyre::Result;
use tasksync_core::notify::Notifier;
use tasksync_remote::PollingMonitor;
use tasksync_store::{run_connectivity_loop, DrainOutcome, TaskStore};
use tracing::{info, warn};

use crate::{config::Config, session::Session};

/// Replay the queue now.
pub async fn run(store: &TaskStore) -> Result<()> {
    if !store.is_online() {
        let pending = store.state().pending_queue.len();
        println!("Server unreachable; {pending} change(s) still queued.");
        return Ok(());
    }
    match store.process_queue().await {
        DrainOutcome::Idle => println!("Nothing to sync."),
        DrainOutcome::AlreadyRunning => println!("A sync is already running."),
        DrainOutcome::Drained(report) => println!(
            "Synced {} change(s), dropped {}, {} left.",
            report.replayed, report.dropped, report.remaining
        ),
    }
    Ok(())
}

pub fn print_queue(store: &TaskStore) {
    let queue = store.state().pending_queue;
    if queue.is_empty() {
        println!("Queue is empty.");
        return;
    }
    for action in &queue {
        println!(
            "{}  {:<12} {}",
            action.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
            action.kind(),
            action.target()
        );
    }
}

/// Keep the store in step with connectivity until Ctrl-C: every reconnect
/// replays the queue, and reminders fire while running.
pub async fn watch(session: Session, config: &Config) -> Result<()> {
    for task in session.store.state().tasks {
        if let Err(err) = session.notifier.schedule(&task).await {
            warn!(error = %err, id = %task.id, "failed to restore reminder");
        }
    }

    let every = Duration::from_secs(config.sync.probe_interval_secs.max(1));
    let monitor = PollingMonitor::new(Arc::clone(&session.probe), every);
    let (updates, poller) = monitor.spawn().await;
    let feeder = tokio::spawn(run_connectivity_loop(Arc::clone(&session.store), updates));
    println!("Watching {} (Ctrl-C to stop)", config.server.base_url);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    feeder.abort();
    poller.abort();
    session.notifier.cancel_all().await?;
    Ok(())
}
