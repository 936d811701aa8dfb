//! Runtime configuration
//!
//! Every field defaults to the fixed constants, so an empty config file
//! yields the production policy.

use crate::constants::{LOCKOUT_DURATION_MS, MAX_FAILED_ATTEMPTS, MS_PER_DAY, SESSION_TIMEOUT_MS};
use crate::privacy::PrivacySettings;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for the session timeout and lockout duration (one year)
pub const MAX_POLICY_WINDOW_MS: i64 = 365 * MS_PER_DAY;

/// Session lifecycle and lockout policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPolicy {
    /// Inactivity window after which a session is expired
    pub session_timeout_ms: i64,
    /// Consecutive creation failures before lockout
    pub max_failed_attempts: u32,
    /// Lockout cooldown
    pub lockout_duration_ms: i64,
    /// Drop a restored session whose fingerprint differs from this device
    pub bind_device_on_restore: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            session_timeout_ms: SESSION_TIMEOUT_MS,
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
            lockout_duration_ms: LOCKOUT_DURATION_MS,
            bind_device_on_restore: false,
        }
    }
}

impl SessionPolicy {
    /// Reject policies that would disable expiry or lockout, or whose
    /// windows exceed [`MAX_POLICY_WINDOW_MS`]
    pub fn validate(&self) -> Result<()> {
        check_window("sessionTimeoutMs", self.session_timeout_ms)?;
        if self.max_failed_attempts == 0 {
            return Err(Error::Config("maxFailedAttempts must be at least 1".to_string()));
        }
        check_window("lockoutDurationMs", self.lockout_duration_ms)
    }
}

fn check_window(name: &str, value_ms: i64) -> Result<()> {
    if value_ms <= 0 {
        return Err(Error::Config(format!("{} must be positive", name)));
    }
    if value_ms > MAX_POLICY_WINDOW_MS {
        return Err(Error::Config(format!(
            "{} must be at most {} ms",
            name, MAX_POLICY_WINDOW_MS
        )));
    }
    Ok(())
}

/// Periodic compliance health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Run the monitor at all
    pub enabled: bool,
    /// Seconds between runs
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300, // 5 minutes
        }
    }
}

/// Aggregate configuration for the security core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityConfig {
    /// Session policy
    pub session: SessionPolicy,
    /// Compliance monitor
    pub monitor: MonitorConfig,
    /// Initial privacy settings
    pub privacy: PrivacySettings,
}

impl SecurityConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SecurityConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.monitor.enabled && self.monitor.interval_secs == 0 {
            return Err(Error::Config("monitor.intervalSecs must be positive".to_string()));
        }
        Ok(())
    }
}
