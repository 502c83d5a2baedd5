use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tasksync_core::{connectivity::ConnectivityProbe, remote::RemoteError};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::client::{build_client, tasks_url};

/// Reachable means the backend answered at all, whatever the status.
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: format!("{}?page=0&size=1", tasks_url(base_url)),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, url = %self.url, "probe failed");
                false
            }
        }
    }
}

/// Polls a probe and publishes reachability on a watch channel, only when it
/// changes.
pub struct PollingMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    every: Duration,
}

impl PollingMonitor {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, every: Duration) -> Self {
        Self { probe, every }
    }

    /// One on-demand check.
    pub async fn check(&self) -> bool {
        self.probe.is_reachable().await
    }

    /// Probe once, then keep polling in the background until every receiver
    /// is gone.
    pub async fn spawn(self) -> (watch::Receiver<bool>, JoinHandle<()>) {
        let initial = self.check().await;
        info!(reachable = initial, "initial reachability");
        let (tx, rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => break,
                }
                let reachable = self.check().await;
                let changed = tx.send_if_modified(|current| {
                    if *current == reachable {
                        return false;
                    }
                    *current = reachable;
                    true
                });
                if changed {
                    info!(reachable, "reachability changed");
                }
            }
            debug!("connectivity monitor stopped");
        });
        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use tasksync_core::connectivity::StaticProbe;
    use tokio::{net::TcpListener, time::timeout};

    use super::*;

    #[tokio::test]
    async fn publishes_only_changes() {
        let probe = StaticProbe::new(false);
        let monitor = PollingMonitor::new(Arc::new(probe.clone()), Duration::from_millis(10));
        let (mut rx, handle) = monitor.spawn().await;
        assert!(!*rx.borrow_and_update());

        probe.set(true);
        timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("change published")
            .expect("monitor alive");
        assert!(*rx.borrow_and_update());

        let quiet = timeout(Duration::from_millis(80), rx.changed()).await;
        assert!(quiet.is_err(), "no event without a change");

        drop(rx);
        timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor stops")
            .expect("join");
    }

    #[tokio::test]
    async fn http_probe_fails_on_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let probe = HttpProbe::new(&format!("http://{addr}"), Duration::from_millis(500))
            .expect("probe");
        assert!(!probe.is_reachable().await);
    }
}
