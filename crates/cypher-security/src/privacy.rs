//! Privacy policy queries over the user's settings

use cypher_params::{DataCollectionKind, PrivacySettings, PrivacySettingsUpdate, MS_PER_DAY};
use parking_lot::RwLock;

/// What to do with a stored record of a given age
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionAction {
    /// Within both windows
    Keep,
    /// Past the anonymization window
    Anonymize,
    /// Past the retention window
    Delete,
}

/// In-memory privacy configuration with policy queries
#[derive(Debug, Default)]
pub struct PrivacyPolicy {
    settings: RwLock<PrivacySettings>,
}

impl PrivacyPolicy {
    /// Create with initial settings
    pub fn new(settings: PrivacySettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> PrivacySettings {
        self.settings.read().clone()
    }

    /// Shallow-merge a partial update and return the result
    pub fn update_settings(&self, update: &PrivacySettingsUpdate) -> PrivacySettings {
        let mut settings = self.settings.write();
        settings.merge(update);
        tracing::info!("Privacy settings updated (level={:?})", settings.level);
        settings.clone()
    }

    /// Consent lookup for a typed collection kind
    pub fn is_collection_allowed(&self, kind: DataCollectionKind) -> bool {
        let settings = self.settings.read();
        match kind {
            DataCollectionKind::Analytics => settings.allow_analytics,
            DataCollectionKind::CrashReporting => settings.allow_crash_reporting,
            DataCollectionKind::UsageData => settings.share_usage_data,
        }
    }

    /// Consent lookup by label; unrecognized labels are denied
    pub fn is_data_collection_allowed(&self, kind: &str) -> bool {
        match DataCollectionKind::parse(kind) {
            Some(kind) => self.is_collection_allowed(kind),
            None => {
                tracing::debug!("Unknown data collection kind '{}' denied", kind);
                false
            }
        }
    }

    /// Whether a record of `age_ms` is past the anonymization window
    pub fn should_anonymize_data(&self, age_ms: i64) -> bool {
        age_ms > i64::from(self.settings.read().anonymize_after_days) * MS_PER_DAY
    }

    /// Whether a record of `age_ms` is past the retention window
    pub fn should_delete_data(&self, age_ms: i64) -> bool {
        age_ms > i64::from(self.settings.read().data_retention_days) * MS_PER_DAY
    }

    /// Combined decision; deletion wins over anonymization
    pub fn retention_action(&self, age_ms: i64) -> RetentionAction {
        if self.should_delete_data(age_ms) {
            RetentionAction::Delete
        } else if self.should_anonymize_data(age_ms) {
            RetentionAction::Anonymize
        } else {
            RetentionAction::Keep
        }
    }
}
