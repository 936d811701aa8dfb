//! Error types

use std::time::Duration;

/// Message shown for any failure that could indicate tampering
pub const SECURE_DATA_UNAVAILABLE: &str = "Secure data unavailable";

/// Security core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cryptographic operation attempted before the key store was initialized
    #[error("Security core not initialized")]
    NotInitialized,

    /// Master key could be neither read nor created
    #[error("Key initialization failed: {0}")]
    KeyInitialization(String),

    /// Encryption error
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Decryption error (malformed, tampered, wrong key or corrupted payload)
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Session creation attempted during lockout cooldown
    #[error("Locked out for another {}s", remaining.as_secs())]
    LockedOut {
        /// Time left until session creation is allowed again
        remaining: Duration,
    },

    /// Protected store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Evidence sink error
    #[error("Evidence error: {0}")]
    Evidence(String),

    /// Parameter or configuration error
    #[error(transparent)]
    Params(#[from] cypher_params::Error),
}

impl Error {
    /// Text suitable for showing to the user.
    ///
    /// Lockouts carry the remaining wait; corruption-style failures never
    /// reveal detail.
    pub fn user_message(&self) -> String {
        match self {
            Error::LockedOut { remaining } => {
                let minutes = remaining.as_secs().div_ceil(60).max(1);
                format!(
                    "Too many failed attempts. Try again in {} minute{}.",
                    minutes,
                    if minutes == 1 { "" } else { "s" }
                )
            }
            Error::Validation(msg) => msg.clone(),
            Error::NotInitialized | Error::KeyInitialization(_) => {
                "Secure storage is not ready. Restart the app.".to_string()
            }
            _ => SECURE_DATA_UNAVAILABLE.to_string(),
        }
    }

    /// True for errors that may indicate tampering or corruption
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Error::Decryption(_))
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_message_rounds_up() {
        let err = Error::LockedOut {
            remaining: Duration::from_secs(61),
        };
        assert_eq!(err.user_message(), "Too many failed attempts. Try again in 2 minutes.");

        let err = Error::LockedOut {
            remaining: Duration::from_secs(5),
        };
        assert_eq!(err.user_message(), "Too many failed attempts. Try again in 1 minute.");
    }

    #[test]
    fn test_decryption_message_is_generic() {
        let err = Error::Decryption("aead::Error at byte 17".to_string());
        assert_eq!(err.user_message(), SECURE_DATA_UNAVAILABLE);
        assert!(err.is_integrity_failure());
    }
}
