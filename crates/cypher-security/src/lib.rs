//! SugarCypher client-side security core
//!
//! Local master key management, envelope encryption of sensitive records,
//! session lifecycle with failed-attempt lockout, privacy policy queries,
//! security health reporting and the compliance evidence trail.
//!
//! Everything is wired through an explicit [`SecurityContext`]; storage is
//! injected as a [`ProtectedStore`] and time as a [`Clock`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod codec;
pub mod context;
pub mod database;
pub mod device;
pub mod error;
pub mod evidence;
pub mod health;
pub mod keystore;
pub mod migrations;
pub mod monitor;
pub mod privacy;
pub mod session;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use codec::{CryptoCodec, EncryptedEnvelope};
pub use context::SecurityContext;
pub use database::{Database, SqliteStore};
pub use device::{DeviceIdentity, DeviceInfo, Platform};
pub use error::{Error, Result, SECURE_DATA_UNAVAILABLE};
pub use evidence::{
    EvidenceEventType, EvidenceRecord, EvidenceRecorder, EvidenceSink, MemoryEvidenceSink,
    SqliteEvidenceSink,
};
pub use health::{HealthIssue, HealthStatus, IssueKind, SecurityHealthReport, SecurityHealthReporter};
pub use keystore::{KeyStore, MasterSecret};
pub use monitor::{CancelToken, ComplianceMonitor};
pub use privacy::{PrivacyPolicy, RetentionAction};
pub use session::{
    CleanupOutcome, LockoutState, Session, SessionEnd, SessionManager, SessionState,
};
pub use store::{MemoryStore, ProtectedStore};

#[cfg(any(test, feature = "test-helpers"))]
pub use clock::ManualClock;

pub use cypher_params::DataClassification;
