use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::store::TaskStore;

/// Feed reachability updates into the store until the sender goes away.
///
/// The current value is applied first. Updates that arrive while a replay is
/// running collapse into the latest one, so a flapping connection costs at most
/// one extra pass.
pub async fn run_connectivity_loop(store: Arc<TaskStore>, mut updates: watch::Receiver<bool>) {
    let initial = *updates.borrow_and_update();
    store.on_connectivity_change(initial).await;

    while updates.changed().await.is_ok() {
        let online = *updates.borrow_and_update();
        store.on_connectivity_change(online).await;
    }
    debug!("connectivity source closed");
}

#[cfg(test)]
mod tests {
    use tasksync_core::{remote::RemoteOp, TaskDraft};

    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn applies_latest_value_and_stops_when_sender_drops() {
        let h = Harness::new(false).await;
        h.store
            .add_task(TaskDraft::new("queued", "offline"))
            .await
            .expect("add");
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("send");
        drop(tx);

        run_connectivity_loop(h.store.clone(), rx).await;

        assert!(h.store.is_online());
        assert_eq!(h.remote.count(RemoteOp::Create), 1);
        assert!(h.store.state().pending_queue.is_empty());
    }

    #[tokio::test]
    async fn each_reconnect_triggers_one_replay() {
        let h = Harness::new(false).await;
        let (tx, rx) = watch::channel(false);
        let feeder = tokio::spawn(run_connectivity_loop(h.store.clone(), rx));

        h.store
            .add_task(TaskDraft::new("first", "offline"))
            .await
            .expect("add");
        tx.send(true).expect("send");
        tokio::task::yield_now().await;
        while !h.store.state().pending_queue.is_empty() {
            tokio::task::yield_now().await;
        }
        tx.send(false).expect("send");
        while h.store.is_online() {
            tokio::task::yield_now().await;
        }

        h.store
            .add_task(TaskDraft::new("second", "offline"))
            .await
            .expect("add");
        tx.send(true).expect("send");
        drop(tx);
        feeder.await.expect("loop task");

        assert_eq!(h.remote.count(RemoteOp::Create), 2);
        assert!(h.store.state().pending_queue.is_empty());
    }
}
