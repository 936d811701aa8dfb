//! Compliance evidence trail
//!
//! Records are built by [`EvidenceRecorder`], enriched with the current
//! session's identifiers, and handed to an [`EvidenceSink`]. The remote audit
//! backend is a sink implemented by the host; this crate ships a durable
//! SQLite outbox and an in-memory sink.

use crate::clock::Clock;
use crate::database::Database;
use crate::session::SessionManager;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Evidence category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceEventType {
    /// Periodic or on-demand compliance checks
    Compliance,
    /// Security-relevant events (lockouts, integrity failures)
    Security,
    /// Actions initiated by the user
    UserAction,
    /// Access to protected records
    DataAccess,
}

impl EvidenceEventType {
    /// Wire label
    pub const fn as_str(&self) -> &'static str {
        match self {
            EvidenceEventType::Compliance => "compliance",
            EvidenceEventType::Security => "security",
            EvidenceEventType::UserAction => "user_action",
            EvidenceEventType::DataAccess => "data_access",
        }
    }
}

impl fmt::Display for EvidenceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compliance" => Ok(EvidenceEventType::Compliance),
            "security" => Ok(EvidenceEventType::Security),
            "user_action" => Ok(EvidenceEventType::UserAction),
            "data_access" => Ok(EvidenceEventType::DataAccess),
            other => Err(Error::Evidence(format!("unknown event type '{}'", other))),
        }
    }
}

/// Structured audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    /// Random UUID
    pub id: String,
    /// Category
    pub event_type: EvidenceEventType,
    /// What happened, e.g. `session_created`
    pub action: String,
    /// Affected resource, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Free-form details (JSON object)
    pub metadata: serde_json::Value,
    /// Session owner at recording time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session id at recording time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Recording time (ms)
    pub timestamp: i64,
}

/// Destination for evidence records
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    /// Accept one record
    async fn submit(&self, record: &EvidenceRecord) -> Result<()>;
}

/// Sink that keeps records in memory
#[derive(Default)]
pub struct MemoryEvidenceSink {
    records: RwLock<Vec<EvidenceRecord>>,
    fail: AtomicBool,
}

impl MemoryEvidenceSink {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in submission order
    pub fn records(&self) -> Vec<EvidenceRecord> {
        self.records.read().clone()
    }

    /// Make every subsequent submit fail
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EvidenceSink for MemoryEvidenceSink {
    async fn submit(&self, record: &EvidenceRecord) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Evidence("sink unavailable".to_string()));
        }
        self.records.write().push(record.clone());
        Ok(())
    }
}

/// Durable outbox of records awaiting upload
#[derive(Clone)]
pub struct SqliteEvidenceSink {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl SqliteEvidenceSink {
    /// Use the `evidence_outbox` table of an opened database; `clock` stamps
    /// `delivered_at`
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Oldest undelivered records first
    pub fn pending(&self, limit: usize) -> Result<Vec<EvidenceRecord>> {
        self.query(
            "SELECT payload FROM evidence_outbox
             WHERE delivered_at IS NULL
             ORDER BY recorded_at ASC, rowid ASC
             LIMIT ?1",
            limit,
        )
    }

    /// Newest records first, delivered or not
    pub fn recent(&self, limit: usize) -> Result<Vec<EvidenceRecord>> {
        self.query(
            "SELECT payload FROM evidence_outbox
             ORDER BY recorded_at DESC, rowid DESC
             LIMIT ?1",
            limit,
        )
    }

    /// Number of undelivered records
    pub fn pending_count(&self) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM evidence_outbox WHERE delivered_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Mark records as uploaded; returns how many were newly marked.
    /// All or none of the ids are marked.
    pub fn mark_delivered(&self, ids: &[String]) -> Result<usize> {
        let now = self.clock.now_ms();
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut marked = 0;
            {
                let mut stmt = tx.prepare(
                    "UPDATE evidence_outbox SET delivered_at = ?1
                     WHERE id = ?2 AND delivered_at IS NULL",
                )?;
                for id in ids {
                    marked += stmt.execute(params![now, id])?;
                }
            }
            tx.commit()?;

            tracing::debug!("Marked {} evidence records delivered", marked);
            Ok(marked)
        })
    }

    /// Delivery time of a record, `None` while pending or unknown
    pub fn delivered_at(&self, id: &str) -> Result<Option<i64>> {
        self.db.with_conn(|conn| {
            let delivered = conn
                .query_row(
                    "SELECT delivered_at FROM evidence_outbox WHERE id = ?1",
                    [id],
                    |row| row.get::<_, Option<i64>>(0),
                )
                .optional()?;
            Ok(delivered.flatten())
        })
    }

    fn query(&self, sql: &str, limit: usize) -> Result<Vec<EvidenceRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([limit], |row| row.get::<_, String>(0))?;

            let mut records = Vec::new();
            for payload in rows {
                records.push(serde_json::from_str(&payload?)?);
            }
            Ok(records)
        })
    }
}

#[async_trait]
impl EvidenceSink for SqliteEvidenceSink {
    async fn submit(&self, record: &EvidenceRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO evidence_outbox (id, event_type, payload, recorded_at, delivered_at)
                 VALUES (?1, ?2, ?3, ?4, NULL)",
                params![record.id, record.event_type.as_str(), payload, record.timestamp],
            )?;
            Ok(())
        })
    }
}

/// Builds evidence records and forwards them to a sink
pub struct EvidenceRecorder {
    sink: Arc<dyn EvidenceSink>,
    sessions: Arc<SessionManager>,
    clock: Arc<dyn Clock>,
}

impl EvidenceRecorder {
    /// Create recorder
    pub fn new(
        sink: Arc<dyn EvidenceSink>,
        sessions: Arc<SessionManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            sessions,
            clock,
        }
    }

    /// Record one event. Sink failures are returned to the caller.
    pub async fn record(
        &self,
        event_type: EvidenceEventType,
        action: &str,
        resource: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<EvidenceRecord> {
        let session = self.sessions.current_session().await;

        let record = EvidenceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            action: action.to_string(),
            resource: resource.map(str::to_string),
            metadata: if metadata.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                metadata
            },
            user_id: session.as_ref().map(|s| s.user_id.clone()),
            session_id: session.map(|s| s.session_id),
            timestamp: self.clock.now_ms(),
        };

        if let Err(e) = self.sink.submit(&record).await {
            tracing::error!("Evidence submission failed ({} {}): {}", event_type, action, e);
            return Err(e);
        }

        tracing::debug!("Evidence recorded: {} {}", event_type, action);
        Ok(record)
    }

    /// Record a compliance event
    pub async fn record_compliance(
        &self,
        action: &str,
        metadata: serde_json::Value,
    ) -> Result<EvidenceRecord> {
        self.record(EvidenceEventType::Compliance, action, None, metadata)
            .await
    }

    /// Record a security event
    pub async fn record_security(
        &self,
        action: &str,
        metadata: serde_json::Value,
    ) -> Result<EvidenceRecord> {
        self.record(EvidenceEventType::Security, action, None, metadata)
            .await
    }

    /// Record a user action on a resource
    pub async fn record_user_action(
        &self,
        action: &str,
        resource: &str,
        metadata: serde_json::Value,
    ) -> Result<EvidenceRecord> {
        self.record(EvidenceEventType::UserAction, action, Some(resource), metadata)
            .await
    }

    /// Record access to a protected resource
    pub async fn record_data_access(
        &self,
        action: &str,
        resource: &str,
        metadata: serde_json::Value,
    ) -> Result<EvidenceRecord> {
        self.record(EvidenceEventType::DataAccess, action, Some(resource), metadata)
            .await
    }
}
