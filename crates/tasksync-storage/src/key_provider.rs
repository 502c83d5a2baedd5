use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::{debug, info};

/// Keyring service the snapshot key is filed under.
pub const KEYRING_SERVICE: &str = "tasksync";
pub const KEYRING_ACCOUNT: &str = "snapshot-key";

/// 256-bit key for encryption at rest. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Label written next to ciphertext; lets a rotated key be told apart.
    pub id: String,
    pub bytes: [u8; 32],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    pub fn generate(id: impl Into<String>) -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self {
            id: id.into(),
            bytes,
        }
    }

    fn encode(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    fn decode(id: &str, secret: &str) -> Result<Self, KeyError> {
        let raw = STANDARD
            .decode(secret.trim())
            .map_err(|e| KeyError::Decode(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::Decode(format!("expected 32 bytes, got {}", raw.len())))?;
        Ok(Self {
            id: id.to_string(),
            bytes,
        })
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("stored key is unusable: {0}")]
    Decode(String),
}

/// Source of the snapshot encryption key.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// The existing key, or a fresh one that is stored for next time.
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Key kept in the OS keyring as base64.
#[derive(Debug, Clone)]
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        match entry.get_password() {
            Ok(secret) => {
                debug!(service = %self.service, "loaded key from keyring");
                KeyMaterial::decode(&self.account, &secret)
            }
            Err(keyring::Error::NoEntry) => {
                let material = KeyMaterial::generate(self.account.clone());
                entry
                    .set_password(&material.encode())
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                info!(service = %self.service, "stored new encryption key in keyring");
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// Process-local key for tests and throwaway stores.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

impl InMemoryKeyProvider {
    pub fn with_key(material: KeyMaterial) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(material))),
        }
    }
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut slot = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(slot
            .get_or_insert_with(|| KeyMaterial::generate("memory"))
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_provider_is_stable() {
        let provider = InMemoryKeyProvider::default();
        let first = provider.get_or_create().await.expect("key");
        let second = provider.get_or_create().await.expect("key");
        assert_eq!(first, second);
    }

    #[test]
    fn decode_round_trips_and_rejects_short_keys() {
        let key = KeyMaterial::generate("k");
        assert_eq!(KeyMaterial::decode("k", &key.encode()).expect("decode"), key);

        let err = KeyMaterial::decode("k", "abcd").expect_err("too short");
        assert!(matches!(err, KeyError::Decode(_)));
    }

    #[test]
    fn debug_hides_key_bytes() {
        let key = KeyMaterial {
            id: "k".into(),
            bytes: [7u8; 32],
        };
        assert!(!format!("{key:?}").contains('7'));
    }
}
