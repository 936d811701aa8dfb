//! Fixed security constants
//!
//! These values define the on-device envelope format and the session
//! policy. Changing any of them breaks compatibility with persisted data.

/// Master secret length in bytes
pub const KEY_LENGTH: usize = 32;

/// Per-envelope PBKDF2 salt length in bytes
pub const SALT_LENGTH: usize = 16;

/// Per-envelope IV length in bytes
pub const IV_LENGTH: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// Session inactivity timeout (30 minutes)
pub const SESSION_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// Consecutive failed session creations before lockout
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Lockout duration (15 minutes)
pub const LOCKOUT_DURATION_MS: i64 = 15 * 60 * 1000;

/// Milliseconds per day, used by retention arithmetic
pub const MS_PER_DAY: i64 = 86_400_000;

/// Protected store key holding the raw master secret
pub const MASTER_KEY_STORE_KEY: &str = "cypher_master_key";

/// Protected store key holding the device fingerprint
pub const DEVICE_FP_STORE_KEY: &str = "cypher_device_fp";

/// Protected store key holding the encrypted session envelope
pub const SESSION_STORE_KEY: &str = "cypher_session";

/// Fingerprint returned when the protected store is unusable
pub const FALLBACK_FINGERPRINT: &str = "fallback_device_fingerprint";
