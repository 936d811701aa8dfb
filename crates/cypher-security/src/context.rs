//! Wiring of the security components
//!
//! A [`SecurityContext`] is built once at startup and owns every component.
//! Tests build a fresh one each.

use crate::clock::{Clock, SystemClock};
use crate::codec::CryptoCodec;
use crate::database::{Database, SqliteStore};
use crate::device::{DeviceIdentity, DeviceInfo};
use crate::evidence::{EvidenceRecorder, EvidenceSink, SqliteEvidenceSink};
use crate::health::SecurityHealthReporter;
use crate::keystore::KeyStore;
use crate::monitor::ComplianceMonitor;
use crate::privacy::PrivacyPolicy;
use crate::session::{CleanupOutcome, SessionManager};
use crate::store::ProtectedStore;
use crate::Result;
use cypher_params::SecurityConfig;
use std::path::Path;
use std::sync::Arc;

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "cypher-security.db";

/// Fully initialized security core
pub struct SecurityContext {
    /// Master key owner
    pub keystore: Arc<KeyStore>,
    /// Envelope encryption
    pub codec: Arc<CryptoCodec>,
    /// Device fingerprint
    pub device: Arc<DeviceIdentity>,
    /// Session lifecycle
    pub sessions: Arc<SessionManager>,
    /// Privacy preferences
    pub privacy: Arc<PrivacyPolicy>,
    /// Health aggregation
    pub health: Arc<SecurityHealthReporter>,
    /// Evidence trail
    pub evidence: Arc<EvidenceRecorder>,
    /// Periodic compliance checks (not started)
    pub monitor: Arc<ComplianceMonitor>,
    /// Outcome of the startup session restore
    pub restore: CleanupOutcome,
}

impl SecurityContext {
    /// Build and initialize every component.
    ///
    /// Order: master key, device fingerprint, persisted session restore.
    /// Fails only if the master key can be neither loaded nor created.
    pub async fn initialize(
        store: Arc<dyn ProtectedStore>,
        evidence_sink: Arc<dyn EvidenceSink>,
        config: SecurityConfig,
        clock: Arc<dyn Clock>,
        device_info: DeviceInfo,
    ) -> Result<Self> {
        config.validate()?;

        let keystore = Arc::new(KeyStore::new(store.clone()));
        keystore.initialize().await?;

        let device = Arc::new(DeviceIdentity::new(store.clone(), clock.clone(), device_info));
        device.initialize().await;

        let codec = Arc::new(CryptoCodec::new(keystore.clone(), clock.clone()));
        let sessions = Arc::new(SessionManager::new(
            store,
            codec.clone(),
            device.clone(),
            clock.clone(),
            config.session.clone(),
        ));
        let restore = sessions.cleanup_expired_sessions().await;

        let privacy = Arc::new(PrivacyPolicy::new(config.privacy.clone()));
        let health = Arc::new(SecurityHealthReporter::new(keystore.clone(), sessions.clone()));
        let evidence = Arc::new(EvidenceRecorder::new(evidence_sink, sessions.clone(), clock));
        let monitor = Arc::new(ComplianceMonitor::new(
            health.clone(),
            evidence.clone(),
            config.monitor.clone(),
        ));

        tracing::info!("Security core initialized (session restore: {:?})", restore);

        Ok(Self {
            keystore,
            codec,
            device,
            sessions,
            privacy,
            health,
            evidence,
            monitor,
            restore,
        })
    }

    /// Open (or create) the SQLite database under `data_dir` and initialize
    /// on top of it with the wall clock. Returns the context and the evidence
    /// outbox sharing that database.
    pub async fn open_sqlite<P: AsRef<Path>>(
        data_dir: P,
        config: SecurityConfig,
        device_info: DeviceInfo,
    ) -> Result<(Self, Arc<SqliteEvidenceSink>)> {
        std::fs::create_dir_all(data_dir.as_ref())
            .map_err(|e| crate::Error::Storage(format!("cannot create data dir: {}", e)))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let db = Arc::new(Database::open(data_dir.as_ref().join(DATABASE_FILE))?);
        let store = Arc::new(SqliteStore::new(db.clone(), clock.clone()));
        let outbox = Arc::new(SqliteEvidenceSink::new(db, clock.clone()));

        let context = Self::initialize(store, outbox.clone(), config, clock, device_info).await?;
        Ok((context, outbox))
    }
}
