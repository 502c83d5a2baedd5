//! Durable blob stores for the task snapshot: plain files, optionally wrapped
//! in AES-GCM encryption keyed from the OS keyring.

pub mod encrypted;
pub mod file_store;
pub mod key_provider;

pub use encrypted::EncryptedBlobStore;
pub use file_store::FileBlobStore;
pub use key_provider::{InMemoryKeyProvider, KeyError, KeyMaterial, KeyProvider, KeyringProvider};
