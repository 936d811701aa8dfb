//! Master secret lifecycle
//!
//! The master secret is the root key for every local envelope. It is
//! created once per install, persisted under `cypher_master_key` in the
//! injected [`ProtectedStore`] and never transmitted. Losing it makes every
//! existing envelope unrecoverable, so it is never regenerated implicitly.

use crate::store::ProtectedStore;
use crate::{Error, Result};
use cypher_params::{KEY_LENGTH, MASTER_KEY_STORE_KEY};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// 32-byte root secret, zeroized on drop
#[derive(Clone)]
pub struct MasterSecret {
    key: Zeroizing<[u8; KEY_LENGTH]>,
}

impl MasterSecret {
    /// Generate new random secret
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
        OsRng.fill_bytes(&mut key[..]);
        Self { key }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(Error::KeyInitialization(format!(
                "Invalid master key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}

/// Owner of the master secret
pub struct KeyStore {
    store: Arc<dyn ProtectedStore>,
    cached: RwLock<Option<MasterSecret>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl KeyStore {
    /// Create key store over a protected store. Nothing is read until
    /// [`initialize`](Self::initialize).
    pub fn new(store: Arc<dyn ProtectedStore>) -> Self {
        Self {
            store,
            cached: RwLock::new(None),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the persisted master secret, creating one on first run.
    ///
    /// Idempotent: later calls return the cached secret. A persisted value
    /// that cannot be read is an error and is never overwritten.
    pub async fn initialize(&self) -> Result<MasterSecret> {
        let cached = self.cached.read().clone();
        if let Some(secret) = cached {
            return Ok(secret);
        }

        let _guard = self.init_lock.lock().await;
        let cached = self.cached.read().clone();
        if let Some(secret) = cached {
            return Ok(secret);
        }

        let persisted = self.store.get(MASTER_KEY_STORE_KEY).await.map_err(|e| {
            tracing::error!("Master key read failed: {}", e);
            Error::KeyInitialization(format!("cannot read master key: {}", e))
        })?;

        let secret = match persisted {
            Some(bytes) => {
                let bytes = Zeroizing::new(bytes);
                let secret = MasterSecret::from_bytes(&bytes)?;
                tracing::debug!("Loaded persisted master key");
                secret
            }
            None => {
                let secret = MasterSecret::generate();
                self.store
                    .set(MASTER_KEY_STORE_KEY, secret.as_bytes())
                    .await
                    .map_err(|e| {
                        tracing::error!("Master key write failed: {}", e);
                        Error::KeyInitialization(format!("cannot persist master key: {}", e))
                    })?;
                tracing::info!("Generated new master key");
                secret
            }
        };

        *self.cached.write() = Some(secret.clone());
        Ok(secret)
    }

    /// Whether the secret is loaded in memory
    pub fn is_initialized(&self) -> bool {
        self.cached.read().is_some()
    }

    /// Cached secret, or `NotInitialized`
    pub fn master_secret(&self) -> Result<MasterSecret> {
        self.cached.read().clone().ok_or(Error::NotInitialized)
    }

    /// Replace the persisted secret with a fresh one.
    ///
    /// Every envelope sealed under the old secret becomes unreadable.
    pub async fn regenerate(&self) -> Result<MasterSecret> {
        let _guard = self.init_lock.lock().await;
        let secret = MasterSecret::generate();
        self.store
            .set(MASTER_KEY_STORE_KEY, secret.as_bytes())
            .await
            .map_err(|e| Error::KeyInitialization(format!("cannot persist master key: {}", e)))?;
        *self.cached.write() = Some(secret.clone());
        tracing::warn!("Master key regenerated; previous envelopes are no longer decryptable");
        Ok(secret)
    }

    /// Drop the in-memory copy. The persisted secret is untouched.
    pub fn evict(&self) {
        *self.cached.write() = None;
        tracing::debug!("Master key evicted from memory");
    }
}
