use std::{sync::Arc, time::Duration};

use color_eyre::Result;
use tasksync_core::{connectivity::ConnectivityProbe, remote::RemoteTaskService, storage::BlobStore};
use tasksync_remote::{HttpProbe, HttpTaskService};
use tasksync_store::{StoreOptions, TaskStore};
use tracing::{info, instrument};

use crate::{config::Config, reminders::TimerNotifier, storage};

/// Everything a command needs: the store wired to the configured server and
/// snapshot storage, plus the probe used to decide connectivity.
pub struct Session {
    pub store: Arc<TaskStore>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub notifier: TimerNotifier,
}

impl Session {
    /// Open the store and report connectivity once. Going online replays
    /// whatever was queued by earlier runs.
    #[instrument(skip_all, fields(base_url = %config.server.base_url, offline = offline))]
    pub async fn open(config: &Config, offline: bool) -> Result<Self> {
        let timeout = Duration::from_secs(config.server.timeout_secs.max(1));
        let remote: Arc<dyn RemoteTaskService> =
            Arc::new(HttpTaskService::new(&config.server.base_url, timeout)?);
        let probe: Arc<dyn ConnectivityProbe> =
            Arc::new(HttpProbe::new(&config.server.base_url, timeout)?);
        let session = Self::with_parts(
            remote,
            storage::store_from_config(config)?,
            probe,
            config.sync.page_size,
        )
        .await?;

        let online = !offline && session.probe.is_reachable().await;
        info!(online, "connectivity at startup");
        session.store.on_connectivity_change(online).await;
        Ok(session)
    }

    pub async fn with_parts(
        remote: Arc<dyn RemoteTaskService>,
        blobs: Arc<dyn BlobStore>,
        probe: Arc<dyn ConnectivityProbe>,
        page_size: u32,
    ) -> Result<Self> {
        let notifier = TimerNotifier::new();
        let store = TaskStore::open(
            remote,
            blobs,
            Arc::new(notifier.clone()),
            StoreOptions {
                page_size: page_size.max(1),
                initially_online: false,
            },
        )
        .await?;
        Ok(Self {
            store: Arc::new(store),
            probe,
            notifier,
        })
    }
}
