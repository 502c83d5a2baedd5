//! The offline-first task store: optimistic mutations, the durable pending
//! queue and its replay against the remote task service.

mod connectivity;
mod error;
mod processor;
pub mod queue;
pub mod snapshot;
mod store;

pub use connectivity::run_connectivity_loop;
pub use error::StoreError;
pub use processor::{DrainOutcome, DrainReport};
pub use store::{StoreOptions, StoreState, TaskStore, DEFAULT_PAGE_SIZE, OFFLINE_NOTICE, SEARCH_FAILED};

#[cfg(test)]
mod test_support;
