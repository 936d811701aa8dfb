//! Single active session with failed-attempt lockout
//!
//! States: NoSession -> Active -> (Expired | Invalidated). A session only
//! becomes active again through a fresh `create_session`. Expiry is passive:
//! it is detected when `validate_session` runs, never by a timer.
//!
//! The session and the lockout counters sit behind one async mutex, so two
//! overlapping `create_session` calls cannot race on `failed_attempts`.

use crate::clock::Clock;
use crate::codec::{CryptoCodec, EncryptedEnvelope};
use crate::device::DeviceIdentity;
use crate::store::ProtectedStore;
use crate::{Error, Result};
use cypher_params::{DataClassification, SessionPolicy, SESSION_STORE_KEY};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Persisted session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Random 256-bit identifier, hex
    pub session_id: String,
    /// Authenticated user
    pub user_id: String,
    /// Creation time (ms)
    pub created_at: i64,
    /// Last successful validation (ms)
    pub last_activity: i64,
    /// Device binding value at creation
    pub device_fingerprint: String,
    /// False once invalidated
    pub is_active: bool,
    /// Expiry if no further activity (ms)
    pub expires_at: i64,
}

impl Session {
    /// Whether the inactivity window has been exceeded at `now`
    pub fn is_expired_at(&self, now: i64, timeout_ms: i64) -> bool {
        now.saturating_sub(self.last_activity) > timeout_ms
    }
}

/// Failed-attempt counters. Process-local, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutState {
    /// Consecutive failed creations
    pub failed_attempts: u32,
    /// Creation is refused while `now < lockout_until` (ms, 0 = never locked)
    pub lockout_until: i64,
}

impl LockoutState {
    /// Whether creation is refused at `now`
    pub fn is_locked(&self, now: i64) -> bool {
        now < self.lockout_until
    }

    /// Time left until unlock, if locked
    pub fn remaining(&self, now: i64) -> Option<Duration> {
        if self.is_locked(now) {
            Some(Duration::from_millis(self.lockout_until.saturating_sub(now) as u64))
        } else {
            None
        }
    }
}

/// Coarse session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session in memory
    NoSession,
    /// A session is held in memory
    Active,
}

/// Why the last session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Inactivity window exceeded
    Expired,
    /// Explicitly invalidated
    Invalidated,
}

/// Result of the startup restore pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Nothing was persisted
    NothingStored,
    /// Persisted session restored as current
    Restored,
    /// Persisted session was expired or inactive and has been deleted
    RemovedExpired,
    /// Persisted session belonged to another device and has been deleted
    RemovedForeignDevice,
    /// Persisted session could not be read or decrypted
    Unreadable,
}

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    lockout: LockoutState,
    last_end: Option<SessionEnd>,
}

/// Session lifecycle owner
pub struct SessionManager {
    store: Arc<dyn ProtectedStore>,
    codec: Arc<CryptoCodec>,
    device: Arc<DeviceIdentity>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    inner: Mutex<Inner>,
}

impl SessionManager {
    /// Create manager
    pub fn new(
        store: Arc<dyn ProtectedStore>,
        codec: Arc<CryptoCodec>,
        device: Arc<DeviceIdentity>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            store,
            codec,
            device,
            clock,
            policy,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start a session for `user_id`, replacing any current one.
    ///
    /// Refused with [`Error::LockedOut`] during cooldown. Any other failure
    /// counts towards the lockout threshold and is returned unchanged.
    pub async fn create_session(&self, user_id: &str) -> Result<Session> {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now_ms();

        if let Some(remaining) = inner.lockout.remaining(now) {
            tracing::warn!(
                "Session creation refused, locked out for {}s",
                remaining.as_secs()
            );
            return Err(Error::LockedOut { remaining });
        }

        match self.build_session(user_id, now).await {
            Ok(session) => {
                if inner.session.is_some() {
                    tracing::debug!("Replacing existing session");
                }
                inner.lockout.failed_attempts = 0;
                inner.session = Some(session.clone());
                tracing::info!("Session created (expires_at={})", session.expires_at);
                Ok(session)
            }
            Err(e) => {
                inner.lockout.failed_attempts = inner.lockout.failed_attempts.saturating_add(1);
                tracing::warn!(
                    "Session creation failed (attempt {}/{}): {}",
                    inner.lockout.failed_attempts,
                    self.policy.max_failed_attempts,
                    e
                );
                if inner.lockout.failed_attempts >= self.policy.max_failed_attempts {
                    inner.lockout.lockout_until =
                        now.saturating_add(self.policy.lockout_duration_ms);
                    tracing::warn!(
                        "Session creation locked until {}",
                        inner.lockout.lockout_until
                    );
                }
                Err(e)
            }
        }
    }

    async fn build_session(&self, user_id: &str, now: i64) -> Result<Session> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(Error::Validation("User id must not be empty".to_string()));
        }

        let mut id = [0u8; 32];
        OsRng.fill_bytes(&mut id);

        let session = Session {
            session_id: hex::encode(id),
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
            device_fingerprint: self.device.initialize().await,
            is_active: true,
            expires_at: now.saturating_add(self.policy.session_timeout_ms),
        };

        self.persist(&session).await?;
        Ok(session)
    }

    /// Check the current session, refreshing its activity window.
    ///
    /// Returns `false` with no session, or after expiring one whose last
    /// activity is older than the timeout.
    pub async fn validate_session(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now_ms();

        let Some(current) = inner.session.clone() else {
            return Ok(false);
        };

        if current.is_expired_at(now, self.policy.session_timeout_ms) {
            tracing::info!(
                "Session expired after {}ms of inactivity",
                now.saturating_sub(current.last_activity)
            );
            self.end_session(&mut inner, SessionEnd::Expired).await;
            return Ok(false);
        }

        let refreshed = Session {
            last_activity: now,
            expires_at: now.saturating_add(self.policy.session_timeout_ms),
            ..current
        };
        self.persist(&refreshed).await?;
        inner.session = Some(refreshed);
        Ok(true)
    }

    /// End the current session. No-op without one.
    ///
    /// The in-memory session is always cleared. Storage failures are logged;
    /// a record that could be neither rewritten nor deleted is still active on
    /// disk and will be restored by the next `cleanup_expired_sessions`.
    pub async fn invalidate_session(&self) {
        let mut inner = self.inner.lock().await;
        self.end_session(&mut inner, SessionEnd::Invalidated).await;
    }

    async fn end_session(&self, inner: &mut Inner, reason: SessionEnd) {
        let Some(mut session) = inner.session.take() else {
            return;
        };
        inner.last_end = Some(reason);
        session.is_active = false;

        if let Err(e) = self.persist(&session).await {
            // An active record left behind would be restored on next start
            tracing::warn!("Persisting ended session failed, deleting record: {}", e);
            if let Err(e) = self.store.delete(SESSION_STORE_KEY).await {
                tracing::error!("Deleting ended session record failed: {}", e);
            }
        }

        tracing::info!("Session ended: {:?}", reason);
    }

    /// Restore or discard the persisted session. Run once at startup.
    ///
    /// Never fails: unreadable records are logged and left in place, and the
    /// manager stays in `NoSession`.
    pub async fn cleanup_expired_sessions(&self) -> CleanupOutcome {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now_ms();

        let bytes = match self.store.get(SESSION_STORE_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return CleanupOutcome::NothingStored,
            Err(e) => {
                tracing::warn!("Reading persisted session failed: {}", e);
                return CleanupOutcome::Unreadable;
            }
        };

        let session: Session = match EncryptedEnvelope::from_bytes(&bytes)
            .and_then(|envelope| self.codec.decrypt(&envelope))
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Persisted session is unreadable: {}", e);
                return CleanupOutcome::Unreadable;
            }
        };

        if !session.is_active || session.is_expired_at(now, self.policy.session_timeout_ms) {
            self.discard_persisted().await;
            tracing::info!("Removed expired persisted session");
            return CleanupOutcome::RemovedExpired;
        }

        if self.policy.bind_device_on_restore {
            let current_fp = self.device.initialize().await;
            if session.device_fingerprint != current_fp {
                self.discard_persisted().await;
                tracing::warn!("Removed persisted session bound to another device");
                return CleanupOutcome::RemovedForeignDevice;
            }
        }

        inner.session = Some(session);
        tracing::info!("Restored persisted session");
        CleanupOutcome::Restored
    }

    async fn discard_persisted(&self) {
        if let Err(e) = self.store.delete(SESSION_STORE_KEY).await {
            tracing::warn!("Deleting persisted session failed: {}", e);
        }
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let envelope = self.codec.encrypt(session, DataClassification::Restricted)?;
        self.store
            .set(SESSION_STORE_KEY, &envelope.to_bytes()?)
            .await
    }

    /// Snapshot of the current session
    pub async fn current_session(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    /// Coarse state
    pub async fn state(&self) -> SessionState {
        if self.inner.lock().await.session.is_some() {
            SessionState::Active
        } else {
            SessionState::NoSession
        }
    }

    /// Why the most recent session ended, if one has
    pub async fn last_end(&self) -> Option<SessionEnd> {
        self.inner.lock().await.last_end
    }

    /// Snapshot of the lockout counters
    pub async fn lockout_state(&self) -> LockoutState {
        self.inner.lock().await.lockout
    }

    /// Whether session creation is currently refused
    pub async fn is_locked_out(&self) -> bool {
        let now = self.clock.now_ms();
        self.inner.lock().await.lockout.is_locked(now)
    }

    /// Time left in the current lockout
    pub async fn remaining_lockout(&self) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.inner.lock().await.lockout.remaining(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::DeviceInfo;
    use crate::keystore::KeyStore;
    use crate::store::MemoryStore;

    const MINUTE: Duration = Duration::from_secs(60);

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        manager: SessionManager,
    }

    async fn fixture_with(store: Arc<MemoryStore>, clock: Arc<ManualClock>, policy: SessionPolicy) -> Fixture {
        let keystore = Arc::new(KeyStore::new(store.clone()));
        keystore.initialize().await.unwrap();
        let codec = Arc::new(CryptoCodec::new(keystore, clock.clone()));
        let device = Arc::new(DeviceIdentity::new(
            store.clone(),
            clock.clone(),
            DeviceInfo::new("android", "14"),
        ));
        let manager = SessionManager::new(store.clone(), codec, device, clock.clone(), policy);
        Fixture {
            store,
            clock,
            manager,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            SessionPolicy::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_create_session_fields() {
        let fx = fixture().await;
        let session = fx.manager.create_session("u1").await.unwrap();

        assert_eq!(session.user_id, "u1");
        assert_eq!(session.session_id.len(), 64);
        assert!(session.is_active);
        assert_eq!(session.created_at, session.last_activity);
        assert_eq!(session.expires_at - session.created_at, 30 * 60 * 1000);
        assert!(fx.store.contains(SESSION_STORE_KEY));
        assert_eq!(fx.manager.state().await, SessionState::Active);
    }

    #[tokio::test]
    async fn test_persisted_session_is_restricted_envelope() {
        let fx = fixture().await;
        fx.manager.create_session("u1").await.unwrap();

        let raw = fx.store.get_raw(SESSION_STORE_KEY).unwrap();
        let envelope = EncryptedEnvelope::from_bytes(&raw).unwrap();
        assert_eq!(envelope.classification, DataClassification::Restricted);
        assert!(!String::from_utf8_lossy(&raw).contains("userId"));
    }

    #[tokio::test]
    async fn test_validate_refreshes_activity() {
        let fx = fixture().await;
        let created = fx.manager.create_session("u1").await.unwrap();

        fx.clock.advance(10 * MINUTE);
        assert!(fx.manager.validate_session().await.unwrap());

        let current = fx.manager.current_session().await.unwrap();
        assert_eq!(current.last_activity, created.last_activity + 10 * 60 * 1000);
        assert_eq!(current.expires_at, current.last_activity + 30 * 60 * 1000);
    }

    #[tokio::test]
    async fn test_validate_without_session() {
        let fx = fixture().await;
        assert!(!fx.manager.validate_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_exact_timeout_is_still_valid() {
        let fx = fixture().await;
        fx.manager.create_session("u1").await.unwrap();
        fx.clock.advance(30 * MINUTE);
        assert!(fx.manager.validate_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry_after_31_minutes() {
        let fx = fixture().await;
        fx.manager.create_session("u1").await.unwrap();

        fx.clock.advance(31 * MINUTE);
        assert!(!fx.manager.validate_session().await.unwrap());
        assert_eq!(fx.manager.state().await, SessionState::NoSession);
        assert_eq!(fx.manager.last_end().await, Some(SessionEnd::Expired));
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let fx = fixture().await;
        fx.manager.create_session("u1").await.unwrap();

        fx.manager.invalidate_session().await;
        assert_eq!(fx.manager.state().await, SessionState::NoSession);
        fx.manager.invalidate_session().await;
        assert_eq!(fx.manager.state().await, SessionState::NoSession);
        assert_eq!(fx.manager.last_end().await, Some(SessionEnd::Invalidated));
    }

    #[tokio::test]
    async fn test_lockout_after_max_failures() {
        let fx = fixture().await;

        for _ in 0..5 {
            let err = fx.manager.create_session("  ").await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        assert_eq!(fx.manager.lockout_state().await.failed_attempts, 5);

        let err = fx.manager.create_session("u1").await.unwrap_err();
        match err {
            Error::LockedOut { remaining } => assert_eq!(remaining, 15 * MINUTE),
            other => panic!("expected lockout, got {:?}", other),
        }

        fx.clock.advance(15 * MINUTE - Duration::from_millis(1));
        assert!(matches!(
            fx.manager.create_session("u1").await,
            Err(Error::LockedOut { .. })
        ));

        fx.clock.advance(Duration::from_millis(1));
        assert!(!fx.manager.is_locked_out().await);
        fx.manager.create_session("u1").await.unwrap();
        assert_eq!(fx.manager.lockout_state().await.failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_success_resets_failures_below_threshold() {
        let fx = fixture().await;
        for _ in 0..4 {
            assert!(fx.manager.create_session("").await.is_err());
        }
        fx.manager.create_session("u1").await.unwrap();
        assert_eq!(fx.manager.lockout_state().await, LockoutState::default());
    }

    #[tokio::test]
    async fn test_storage_failure_counts_as_failed_attempt() {
        let fx = fixture().await;
        fx.store.set_fail_writes(true);
        assert!(matches!(
            fx.manager.create_session("u1").await,
            Err(Error::Storage(_))
        ));
        assert_eq!(fx.manager.lockout_state().await.failed_attempts, 1);
        assert_eq!(fx.manager.state().await, SessionState::NoSession);
    }

    #[tokio::test]
    async fn test_invalidate_with_failing_store_still_ends_session() {
        let fx = fixture().await;
        fx.manager.create_session("u1").await.unwrap();

        fx.store.set_fail_writes(true);
        fx.manager.invalidate_session().await;

        assert_eq!(fx.manager.state().await, SessionState::NoSession);
        assert_eq!(fx.manager.last_end().await, Some(SessionEnd::Invalidated));
    }

    #[tokio::test]
    async fn test_expiry_with_failing_store_reports_invalid() {
        let fx = fixture().await;
        fx.manager.create_session("u1").await.unwrap();

        fx.clock.advance(31 * MINUTE);
        fx.store.set_fail_writes(true);
        assert!(!fx.manager.validate_session().await.unwrap());
        assert_eq!(fx.manager.last_end().await, Some(SessionEnd::Expired));
    }

    #[tokio::test]
    async fn test_unbounded_policy_windows_saturate() {
        let policy = SessionPolicy {
            session_timeout_ms: i64::MAX,
            max_failed_attempts: 1,
            lockout_duration_ms: i64::MAX,
            bind_device_on_restore: false,
        };
        let fx = fixture_with(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            policy,
        )
        .await;

        let session = fx.manager.create_session("u1").await.unwrap();
        assert_eq!(session.expires_at, i64::MAX);
        fx.clock.advance(MINUTE);
        assert!(fx.manager.validate_session().await.unwrap());
        assert_eq!(fx.manager.current_session().await.unwrap().expires_at, i64::MAX);

        assert!(fx.manager.create_session(" ").await.is_err());
        assert_eq!(fx.manager.lockout_state().await.lockout_until, i64::MAX);
        assert!(matches!(
            fx.manager.create_session("u1").await,
            Err(Error::LockedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_restores_live_session() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let first = fixture_with(store.clone(), clock.clone(), SessionPolicy::default()).await;
        let created = first.manager.create_session("u1").await.unwrap();

        clock.advance(5 * MINUTE);
        let restarted = fixture_with(store, clock, SessionPolicy::default()).await;
        assert_eq!(
            restarted.manager.cleanup_expired_sessions().await,
            CleanupOutcome::Restored
        );
        assert_eq!(restarted.manager.current_session().await, Some(created));
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_session() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let first = fixture_with(store.clone(), clock.clone(), SessionPolicy::default()).await;
        first.manager.create_session("u1").await.unwrap();

        clock.advance(45 * MINUTE);
        let restarted = fixture_with(store.clone(), clock, SessionPolicy::default()).await;
        assert_eq!(
            restarted.manager.cleanup_expired_sessions().await,
            CleanupOutcome::RemovedExpired
        );
        assert!(!store.contains(SESSION_STORE_KEY));
        assert_eq!(restarted.manager.state().await, SessionState::NoSession);
    }

    #[tokio::test]
    async fn test_cleanup_removes_invalidated_session() {
        let fx = fixture().await;
        fx.manager.create_session("u1").await.unwrap();
        fx.manager.invalidate_session().await;

        assert_eq!(
            fx.manager.cleanup_expired_sessions().await,
            CleanupOutcome::RemovedExpired
        );
    }

    #[tokio::test]
    async fn test_cleanup_swallows_corruption() {
        let fx = fixture().await;
        fx.store.put_raw(SESSION_STORE_KEY, b"garbage".to_vec());

        assert_eq!(
            fx.manager.cleanup_expired_sessions().await,
            CleanupOutcome::Unreadable
        );
        assert_eq!(fx.manager.state().await, SessionState::NoSession);
    }

    #[tokio::test]
    async fn test_cleanup_device_binding_opt_in() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let first = fixture_with(store.clone(), clock.clone(), SessionPolicy::default()).await;
        first.manager.create_session("u1").await.unwrap();

        // Simulate a restore onto a device with a different fingerprint
        store.put_raw(cypher_params::DEVICE_FP_STORE_KEY, b"other-device".to_vec());

        let policy = SessionPolicy {
            bind_device_on_restore: true,
            ..Default::default()
        };
        let restarted = fixture_with(store.clone(), clock, policy).await;
        assert_eq!(
            restarted.manager.cleanup_expired_sessions().await,
            CleanupOutcome::RemovedForeignDevice
        );
        assert!(!store.contains(SESSION_STORE_KEY));
    }
}
