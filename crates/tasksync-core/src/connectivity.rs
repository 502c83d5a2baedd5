use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;

/// On-demand reachability check against the task backend.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe answering with a value the caller controls.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    reachable: Arc<AtomicBool>,
}

impl StaticProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: Arc::new(AtomicBool::new(reachable)),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
