//! Aggregated security health
//!
//! Checks run in a fixed order: master key, session, lockout. A missing
//! master key or an active lockout is critical; anything else is a warning.

use crate::keystore::KeyStore;
use crate::session::SessionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Overall status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No issues
    Healthy,
    /// Degraded, app remains usable
    Warning,
    /// Secure operations are unavailable
    Critical,
}

/// What an issue is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Master key not loaded
    MasterKeyMissing,
    /// No valid session
    SessionInvalid,
    /// Session validation itself failed
    SessionCheckFailed,
    /// Session creation is locked out
    LockedOut,
}

impl IssueKind {
    /// Whether this issue alone makes the report critical
    pub const fn is_critical(&self) -> bool {
        matches!(self, IssueKind::MasterKeyMissing | IssueKind::LockedOut)
    }
}

/// Single finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthIssue {
    /// Category
    pub kind: IssueKind,
    /// Human-readable description
    pub message: String,
}

/// Result of a health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Findings in evaluation order
    pub issues: Vec<HealthIssue>,
    /// Remediation hints, one per issue
    pub recommendations: Vec<String>,
}

impl SecurityHealthReport {
    fn from_findings(findings: Vec<(IssueKind, String, String)>) -> Self {
        let status = if findings.iter().any(|(kind, _, _)| kind.is_critical()) {
            HealthStatus::Critical
        } else if !findings.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let mut issues = Vec::with_capacity(findings.len());
        let mut recommendations = Vec::with_capacity(findings.len());
        for (kind, message, recommendation) in findings {
            issues.push(HealthIssue { kind, message });
            recommendations.push(recommendation);
        }

        Self {
            status,
            issues,
            recommendations,
        }
    }
}

/// Health reporter over the key store and session manager
pub struct SecurityHealthReporter {
    keystore: Arc<KeyStore>,
    sessions: Arc<SessionManager>,
}

impl SecurityHealthReporter {
    /// Create reporter
    pub fn new(keystore: Arc<KeyStore>, sessions: Arc<SessionManager>) -> Self {
        Self { keystore, sessions }
    }

    /// Run all checks. Validating the session refreshes or expires it.
    pub async fn check(&self) -> SecurityHealthReport {
        let mut findings = Vec::new();

        if !self.keystore.is_initialized() {
            findings.push((
                IssueKind::MasterKeyMissing,
                "Master encryption key is not available".to_string(),
                "Restart the app to re-initialize secure storage".to_string(),
            ));
        }

        match self.sessions.validate_session().await {
            Ok(true) => {}
            Ok(false) => findings.push((
                IssueKind::SessionInvalid,
                "No valid session".to_string(),
                "Sign in again to start a new session".to_string(),
            )),
            Err(e) => {
                tracing::warn!("Session validation failed during health check: {}", e);
                findings.push((
                    IssueKind::SessionCheckFailed,
                    "Session could not be validated".to_string(),
                    "Sign out and sign in again".to_string(),
                ));
            }
        }

        if let Some(remaining) = self.sessions.remaining_lockout().await {
            let minutes = remaining.as_secs().div_ceil(60).max(1);
            findings.push((
                IssueKind::LockedOut,
                format!("Sign-in is locked for {} more minute(s)", minutes),
                format!("Wait {} minute(s) before signing in again", minutes),
            ));
        }

        let report = SecurityHealthReport::from_findings(findings);
        tracing::debug!(
            "Security health: {:?} ({} issues)",
            report.status,
            report.issues.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rules() {
        let healthy = SecurityHealthReport::from_findings(vec![]);
        assert_eq!(healthy.status, HealthStatus::Healthy);

        let warning = SecurityHealthReport::from_findings(vec![(
            IssueKind::SessionInvalid,
            "m".to_string(),
            "r".to_string(),
        )]);
        assert_eq!(warning.status, HealthStatus::Warning);

        let critical = SecurityHealthReport::from_findings(vec![
            (IssueKind::SessionInvalid, "m".to_string(), "r".to_string()),
            (IssueKind::LockedOut, "m".to_string(), "r".to_string()),
        ]);
        assert_eq!(critical.status, HealthStatus::Critical);
        assert_eq!(critical.issues.len(), critical.recommendations.len());
    }
}
