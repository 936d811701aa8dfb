//! Privacy settings data model
//!
//! The settings are plain configuration. Policy queries over them live in
//! `cypher_security::privacy`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Overall privacy posture chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// Telemetry allowed, long retention
    Standard,
    /// Crash reports only, moderate retention
    Enhanced,
    /// Nothing leaves the device, short retention
    Maximum,
}

impl FromStr for PrivacyLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(PrivacyLevel::Standard),
            "enhanced" => Ok(PrivacyLevel::Enhanced),
            "maximum" => Ok(PrivacyLevel::Maximum),
            other => Err(Error::InvalidPrivacyLevel(other.to_string())),
        }
    }
}

/// Kinds of data collection gated by the privacy settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataCollectionKind {
    /// Product analytics
    Analytics,
    /// Crash reports
    CrashReporting,
    /// Usage statistics shared with the backend
    UsageData,
}

impl DataCollectionKind {
    /// Parse a caller-supplied label. Unknown labels yield `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "analytics" => Some(DataCollectionKind::Analytics),
            "crash" | "crash_reporting" | "crashreporting" => Some(DataCollectionKind::CrashReporting),
            "usage" | "usage_data" | "usagedata" => Some(DataCollectionKind::UsageData),
            _ => None,
        }
    }
}

/// User-configurable data handling preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    /// Selected posture
    pub level: PrivacyLevel,
    /// Records older than this are deleted
    pub data_retention_days: u32,
    /// Records older than this are anonymized
    pub anonymize_after_days: u32,
    /// Product analytics consent
    pub allow_analytics: bool,
    /// Crash reporting consent
    pub allow_crash_reporting: bool,
    /// Usage data sharing consent
    pub share_usage_data: bool,
    /// Keep all processing on-device
    pub local_processing_only: bool,
}

impl PrivacySettings {
    /// Preset for a privacy level
    pub const fn for_level(level: PrivacyLevel) -> Self {
        match level {
            PrivacyLevel::Standard => Self {
                level,
                data_retention_days: 365,
                anonymize_after_days: 90,
                allow_analytics: true,
                allow_crash_reporting: true,
                share_usage_data: false,
                local_processing_only: false,
            },
            PrivacyLevel::Enhanced => Self {
                level,
                data_retention_days: 180,
                anonymize_after_days: 30,
                allow_analytics: false,
                allow_crash_reporting: true,
                share_usage_data: false,
                local_processing_only: false,
            },
            PrivacyLevel::Maximum => Self {
                level,
                data_retention_days: 30,
                anonymize_after_days: 7,
                allow_analytics: false,
                allow_crash_reporting: false,
                share_usage_data: false,
                local_processing_only: true,
            },
        }
    }

    /// Shallow merge: fields absent from `update` keep their current value
    pub fn merge(&mut self, update: &PrivacySettingsUpdate) {
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(days) = update.data_retention_days {
            self.data_retention_days = days;
        }
        if let Some(days) = update.anonymize_after_days {
            self.anonymize_after_days = days;
        }
        if let Some(flag) = update.allow_analytics {
            self.allow_analytics = flag;
        }
        if let Some(flag) = update.allow_crash_reporting {
            self.allow_crash_reporting = flag;
        }
        if let Some(flag) = update.share_usage_data {
            self.share_usage_data = flag;
        }
        if let Some(flag) = update.local_processing_only {
            self.local_processing_only = flag;
        }
    }
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self::for_level(PrivacyLevel::Enhanced)
    }
}

/// Partial privacy settings; `None` fields are left untouched on merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacySettingsUpdate {
    /// New posture
    pub level: Option<PrivacyLevel>,
    /// New retention window
    pub data_retention_days: Option<u32>,
    /// New anonymization window
    pub anonymize_after_days: Option<u32>,
    /// New analytics consent
    pub allow_analytics: Option<bool>,
    /// New crash reporting consent
    pub allow_crash_reporting: Option<bool>,
    /// New usage sharing consent
    pub share_usage_data: Option<bool>,
    /// New on-device processing preference
    pub local_processing_only: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let mut settings = PrivacySettings::default();
        let before = settings.clone();

        settings.merge(&PrivacySettingsUpdate {
            allow_analytics: Some(true),
            ..Default::default()
        });

        assert!(settings.allow_analytics);
        assert_eq!(settings.data_retention_days, before.data_retention_days);
        assert_eq!(settings.anonymize_after_days, before.anonymize_after_days);
        assert_eq!(settings.level, before.level);
    }

    #[test]
    fn test_update_from_partial_json() {
        let update: PrivacySettingsUpdate =
            serde_json::from_str(r#"{"dataRetentionDays": 14}"#).unwrap();
        assert_eq!(update.data_retention_days, Some(14));
        assert_eq!(update.allow_analytics, None);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(DataCollectionKind::parse("analytics"), Some(DataCollectionKind::Analytics));
        assert_eq!(DataCollectionKind::parse("crash"), Some(DataCollectionKind::CrashReporting));
        assert_eq!(DataCollectionKind::parse("usage"), Some(DataCollectionKind::UsageData));
        assert_eq!(DataCollectionKind::parse("location"), None);
    }

    #[test]
    fn test_maximum_preset_is_local_only() {
        let settings = PrivacySettings::for_level(PrivacyLevel::Maximum);
        assert!(settings.local_processing_only);
        assert!(!settings.allow_crash_reporting);
    }
}
