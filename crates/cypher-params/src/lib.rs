//! SugarCypher security parameters and constants
//!
//! This crate provides the fixed cryptographic and session constants,
//! data classification tiers, privacy settings and the configuration
//! structs shared by the security core and its binaries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classification;
pub mod config;
pub mod constants;
pub mod privacy;

pub use classification::DataClassification;
pub use config::{MonitorConfig, SecurityConfig, SessionPolicy, MAX_POLICY_WINDOW_MS};
pub use constants::*;
pub use privacy::{DataCollectionKind, PrivacyLevel, PrivacySettings, PrivacySettingsUpdate};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown classification label
    #[error("Invalid classification: {0}")]
    InvalidClassification(String),

    /// Unknown privacy level label
    #[error("Invalid privacy level: {0}")]
    InvalidPrivacyLevel(String),

    /// Configuration could not be read or is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file I/O failure
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
