//! HTTP binding of the remote task service and connectivity monitoring.

mod client;
mod dto;
mod monitor;

pub use client::{HttpTaskService, DEFAULT_TIMEOUT, TASKS_PATH};
pub use monitor::{HttpProbe, PollingMonitor};
