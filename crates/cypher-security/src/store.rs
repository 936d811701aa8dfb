//! Protected key-value store abstraction
//!
//! The security core never talks to a platform store directly. A concrete
//! backend is chosen once at startup and injected as `Arc<dyn ProtectedStore>`:
//! - Mobile: Keychain / Android Keystore-backed secure storage (host bridge)
//! - Desktop and CLI: [`SqliteStore`](crate::database::SqliteStore)
//! - Tests: [`MemoryStore`]

use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Protected storage capability
#[async_trait]
pub trait ProtectedStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, replacing any existing one
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a value; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and platforms without native integration
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set`/`delete` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Check whether a key is present (bypasses failure injection)
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Overwrite raw bytes (bypasses failure injection)
    pub fn put_raw(&self, key: &str, value: Vec<u8>) {
        self.entries.write().insert(key.to_string(), value);
    }

    /// Read raw bytes (bypasses failure injection)
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }
}

#[async_trait]
impl ProtectedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("read of {} failed", key)));
        }
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("write of {} failed", key)));
        }
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("delete of {} failed", key)));
        }
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", b"value").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"value".to_vec()));

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.set("k", b"v").await.is_err());
        assert!(!store.contains("k"));

        store.set_fail_writes(false);
        store.set("k", b"v").await.unwrap();
        store.set_fail_reads(true);
        assert!(store.get("k").await.is_err());
    }
}
