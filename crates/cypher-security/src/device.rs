//! Best-effort device fingerprint
//!
//! The fingerprint is a binding value stored inside each session. It is not
//! a stable device identity: a fresh install produces a new one. Storage
//! problems degrade to [`FALLBACK_FINGERPRINT`] and never block the app.

use crate::clock::Clock;
use crate::store::ProtectedStore;
use cypher_params::{DEVICE_FP_STORE_KEY, FALLBACK_FINGERPRINT};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Android
    Android,
    /// iOS
    Ios,
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Linux
    Linux,
    /// Unknown platform
    Unknown,
}

impl Platform {
    /// Detect current platform at compile time
    pub fn current() -> Self {
        #[cfg(target_os = "android")]
        return Platform::Android;

        #[cfg(target_os = "ios")]
        return Platform::Ios;

        #[cfg(target_os = "macos")]
        return Platform::MacOs;

        #[cfg(target_os = "windows")]
        return Platform::Windows;

        #[cfg(target_os = "linux")]
        return Platform::Linux;

        #[cfg(not(any(
            target_os = "android",
            target_os = "ios",
            target_os = "macos",
            target_os = "windows",
            target_os = "linux"
        )))]
        return Platform::Unknown;
    }

    /// Lower-case name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }
}

/// Platform attributes mixed into the fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Platform name
    pub platform: String,
    /// OS version as reported by the host
    pub os_version: String,
}

impl DeviceInfo {
    /// Attributes supplied by the host app
    pub fn new(platform: impl Into<String>, os_version: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            os_version: os_version.into(),
        }
    }

    /// Best guess from the build target
    pub fn detect() -> Self {
        Self::new(
            Platform::current().as_str(),
            format!("{}/{}", std::env::consts::FAMILY, std::env::consts::ARCH),
        )
    }
}

/// Device fingerprint owner
pub struct DeviceIdentity {
    store: Arc<dyn ProtectedStore>,
    clock: Arc<dyn Clock>,
    info: DeviceInfo,
    cached: RwLock<Option<String>>,
}

impl DeviceIdentity {
    /// Create identity provider
    pub fn new(store: Arc<dyn ProtectedStore>, clock: Arc<dyn Clock>, info: DeviceInfo) -> Self {
        Self {
            store,
            clock,
            info,
            cached: RwLock::new(None),
        }
    }

    /// Return the persisted fingerprint, deriving and persisting one on first
    /// run. Never fails.
    pub async fn initialize(&self) -> String {
        let cached = self.cached.read().clone();
        if let Some(fp) = cached {
            return fp;
        }

        match self.store.get(DEVICE_FP_STORE_KEY).await {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(fp) if !fp.is_empty() => {
                    *self.cached.write() = Some(fp.clone());
                    return fp;
                }
                _ => tracing::warn!("Stored device fingerprint is unreadable, deriving a new one"),
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Device fingerprint read failed, using fallback: {}", e);
                return FALLBACK_FINGERPRINT.to_string();
            }
        }

        let fp = self.derive();
        if let Err(e) = self.store.set(DEVICE_FP_STORE_KEY, fp.as_bytes()).await {
            tracing::warn!("Device fingerprint write failed, using fallback: {}", e);
            return FALLBACK_FINGERPRINT.to_string();
        }

        tracing::debug!("Derived new device fingerprint");
        *self.cached.write() = Some(fp.clone());
        fp
    }

    /// Cached fingerprint, or the fallback before a successful initialize
    pub fn fingerprint(&self) -> String {
        self.cached
            .read()
            .clone()
            .unwrap_or_else(|| FALLBACK_FINGERPRINT.to_string())
    }

    fn derive(&self) -> String {
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);

        let material = serde_json::json!({
            "platform": self.info.platform,
            "osVersion": self.info.os_version,
            "timestamp": self.clock.now_ms(),
            "nonce": hex::encode(nonce),
        });

        hex::encode(Sha256::digest(material.to_string().as_bytes()))
    }
}
