//! Periodic compliance checks
//!
//! Runs the health reporter on a fixed interval and records each result as
//! `compliance` evidence. At most one run is in flight; a tick that arrives
//! while a run is still going is skipped.

use crate::evidence::EvidenceRecorder;
use crate::health::{SecurityHealthReport, SecurityHealthReporter};
use crate::Result;
use cypher_params::MonitorConfig;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cancellation token shared between the monitor task and its owner
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation and wake waiters
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        // Created before the flag check so a concurrent cancel is not missed
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-interval compliance monitor
pub struct ComplianceMonitor {
    health: Arc<SecurityHealthReporter>,
    evidence: Arc<EvidenceRecorder>,
    config: MonitorConfig,
    running: Mutex<()>,
    cancel: CancelToken,
}

impl ComplianceMonitor {
    /// Create monitor
    pub fn new(
        health: Arc<SecurityHealthReporter>,
        evidence: Arc<EvidenceRecorder>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            health,
            evidence,
            config,
            running: Mutex::new(()),
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops the spawned loop
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one check and record it.
    ///
    /// Returns `Ok(None)` when another run holds the slot.
    pub async fn run_once(&self) -> Result<Option<SecurityHealthReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("Compliance check already running, skipping");
            return Ok(None);
        };

        let report = self.health.check().await;
        self.evidence
            .record_compliance(
                "security_health_check",
                serde_json::json!({
                    "status": report.status,
                    "issues": report.issues,
                    "recommendations": report.recommendations,
                }),
            )
            .await?;

        tracing::info!("Compliance check recorded: {:?}", report.status);
        Ok(Some(report))
    }

    /// Start the periodic loop. Returns `None` when disabled by config.
    pub fn spawn(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::info!("Compliance monitor disabled");
            return None;
        }

        let period = Duration::from_secs(self.config.interval_secs.max(1));
        tracing::info!("Starting compliance monitor: interval={}s", period.as_secs());

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        if let Err(e) = self.run_once().await {
                            tracing::warn!("Compliance check failed: {}", e);
                        }
                    }
                }
            }

            tracing::info!("Compliance monitor stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec::CryptoCodec;
    use crate::device::{DeviceIdentity, DeviceInfo};
    use crate::evidence::{EvidenceEventType, MemoryEvidenceSink};
    use crate::health::HealthStatus;
    use crate::keystore::KeyStore;
    use crate::session::SessionManager;
    use crate::store::MemoryStore;
    use cypher_params::SessionPolicy;

    async fn monitor(config: MonitorConfig) -> (Arc<ComplianceMonitor>, Arc<MemoryEvidenceSink>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = Arc::new(MemoryStore::new());
        let keystore = Arc::new(KeyStore::new(store.clone()));
        keystore.initialize().await.unwrap();
        let codec = Arc::new(CryptoCodec::new(keystore.clone(), clock.clone()));
        let device = Arc::new(DeviceIdentity::new(
            store.clone(),
            clock.clone(),
            DeviceInfo::new("linux", "6.1"),
        ));
        let sessions = Arc::new(SessionManager::new(
            store,
            codec,
            device,
            clock.clone(),
            SessionPolicy::default(),
        ));

        let sink = Arc::new(MemoryEvidenceSink::new());
        let evidence = Arc::new(EvidenceRecorder::new(sink.clone(), sessions.clone(), clock));
        let health = Arc::new(SecurityHealthReporter::new(keystore, sessions));
        (
            Arc::new(ComplianceMonitor::new(health, evidence, config)),
            sink,
        )
    }

    #[tokio::test]
    async fn test_run_once_records_compliance() {
        let (monitor, sink) = monitor(MonitorConfig::default()).await;
        let report = monitor.run_once().await.unwrap().unwrap();

        // No session yet
        assert_eq!(report.status, HealthStatus::Warning);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, EvidenceEventType::Compliance);
        assert_eq!(records[0].metadata["status"], "warning");
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let (monitor, sink) = monitor(MonitorConfig::default()).await;
        let _held = monitor.running.lock().await;

        assert!(monitor.run_once().await.unwrap().is_none());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_monitor_does_not_spawn() {
        let (monitor, _) = monitor(MonitorConfig {
            enabled: false,
            interval_secs: 60,
        })
        .await;
        assert!(monitor.spawn().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_until_cancelled() {
        let (monitor, sink) = monitor(MonitorConfig {
            enabled: true,
            interval_secs: 60,
        })
        .await;
        let token = monitor.cancel_token();
        let handle = monitor.spawn().unwrap();

        tokio::time::sleep(Duration::from_secs(150)).await;
        let runs = sink.records().len();
        assert!(runs >= 2, "expected at least two runs, got {}", runs);

        token.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(sink.records().len(), runs);
    }

    #[tokio::test]
    async fn test_cancel_before_wait() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }
}
