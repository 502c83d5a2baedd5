use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use tasksync_core::storage::{BlobStore, BlobStoreError};
use tokio::sync::OnceCell;
use tracing::{instrument, warn};

use crate::{file_store::storage_err, key_provider::KeyProvider};

const ENVELOPE_VERSION: u8 = 1;

/// Sealed form of one blob.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    version: u8,
    key_id: String,
    nonce: String,
    ciphertext: String,
}

/// Encrypts every blob with AES-256-GCM before handing it to `inner`.
///
/// The key is fetched from the provider on first use and kept for the life of
/// the store. Blobs written before encryption was switched on are still read
/// (and come back encrypted on the next write).
pub struct EncryptedBlobStore<S, P> {
    inner: S,
    keys: P,
    cipher: OnceCell<(String, Aes256Gcm)>,
}

impl<S: BlobStore, P: KeyProvider> EncryptedBlobStore<S, P> {
    pub fn new(inner: S, keys: P) -> Self {
        Self {
            inner,
            keys,
            cipher: OnceCell::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn cipher(&self) -> Result<&(String, Aes256Gcm), BlobStoreError> {
        self.cipher
            .get_or_try_init(|| async {
                let material = self
                    .keys
                    .get_or_create()
                    .await
                    .map_err(|e| storage_err(format!("key provider: {e}")))?;
                let cipher = Aes256Gcm::new_from_slice(&material.bytes)
                    .map_err(|e| storage_err(format!("cipher init failed: {e}")))?;
                Ok((material.id, cipher))
            })
            .await
    }

    async fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, BlobStoreError> {
        let (key_id, cipher) = self.cipher().await?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| storage_err(format!("encrypt failed: {e}")))?;
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            key_id: key_id.clone(),
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        };
        serde_json::to_vec(&envelope).map_err(storage_err)
    }

    async fn open(&self, envelope: Envelope) -> Result<Vec<u8>, BlobStoreError> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(storage_err(format!(
                "unsupported envelope version {}",
                envelope.version
            )));
        }
        let (key_id, cipher) = self.cipher().await?;
        if &envelope.key_id != key_id {
            warn!(stored = %envelope.key_id, current = %key_id, "blob sealed under a different key id");
        }
        let nonce = URL_SAFE_NO_PAD
            .decode(&envelope.nonce)
            .map_err(|e| storage_err(format!("nonce decode failed: {e}")))?;
        if nonce.len() != 12 {
            return Err(storage_err(format!("bad nonce length {}", nonce.len())));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(&envelope.ciphertext)
            .map_err(|e| storage_err(format!("ciphertext decode failed: {e}")))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|e| storage_err(format!("decrypt failed: {e}")))
    }
}

#[async_trait]
impl<S: BlobStore, P: KeyProvider> BlobStore for EncryptedBlobStore<S, P> {
    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), BlobStoreError> {
        let sealed = self.seal(value).await?;
        self.inner.put(key, &sealed).await
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let stored = self.inner.get(key).await?;
        match serde_json::from_slice::<Envelope>(&stored) {
            Ok(envelope) => self.open(envelope).await,
            Err(_) => {
                warn!(key, "blob is not encrypted, reading as plain text");
                Ok(stored)
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.inner.delete(key).await
    }
}
