//! Core abstractions for tasksync: the task domain and the contracts of every
//! collaborator the sync engine talks to (remote service, blob storage,
//! notifications, connectivity). Kept free of I/O so the engine and its tests
//! can swap implementations freely.

pub mod connectivity;
pub mod notify;
pub mod remote;
pub mod storage;
pub mod task;
pub mod timestamp;

pub use task::{Task, TaskDraft, TaskId, TaskPage, ValidationError};
