//! Envelope encryption of structured data
//!
//! Every call draws a fresh 16-byte salt and 16-byte IV, derives a 256-bit
//! key from the master secret with PBKDF2-HMAC-SHA256 (10 000 iterations)
//! and seals the JSON serialization of the data with AES-256-GCM. The
//! classification label is bound as associated data, so relabelling an
//! envelope is detected like any other ciphertext change.
//!
//! Envelope JSON: `{ ciphertext: base64, iv: hex, salt: hex, timestamp: ms, classification }`

use crate::clock::Clock;
use crate::keystore::{KeyStore, MasterSecret};
use crate::{Error, Result};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use cypher_params::{DataClassification, IV_LENGTH, KEY_LENGTH, PBKDF2_ITERATIONS, SALT_LENGTH};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use zeroize::Zeroizing;

/// AES-256-GCM with a 128-bit IV
type EnvelopeCipher = AesGcm<Aes256, U16>;

/// Self-contained encrypted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Base64 ciphertext with trailing authentication tag
    pub ciphertext: String,
    /// Hex IV
    pub iv: String,
    /// Hex PBKDF2 salt
    pub salt: String,
    /// Encryption time, epoch milliseconds
    pub timestamp: i64,
    /// Sensitivity tier at encryption time
    pub classification: DataClassification,
}

impl EncryptedEnvelope {
    /// Serialize for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a stored envelope. Malformed input is a decryption failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Decryption(format!("malformed envelope: {}", e)))
    }
}

/// Derive the per-envelope key from the master secret and salt
pub fn derive_envelope_key(secret: &MasterSecret, salt: &[u8]) -> Zeroizing<[u8; KEY_LENGTH]> {
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key[..]);
    key
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Envelope encryption under the key store's master secret
pub struct CryptoCodec {
    keystore: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
}

impl CryptoCodec {
    /// Create codec. The key store must be initialized before use.
    pub fn new(keystore: Arc<KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { keystore, clock }
    }

    /// Encrypt the JSON serialization of `data`
    pub fn encrypt<T: Serialize + ?Sized>(
        &self,
        data: &T,
        classification: DataClassification,
    ) -> Result<EncryptedEnvelope> {
        let secret = self.keystore.master_secret()?;

        let plaintext = Zeroizing::new(
            serde_json::to_vec(data)
                .map_err(|e| Error::Encryption(format!("cannot serialize payload: {}", e)))?,
        );

        let salt = random_bytes::<SALT_LENGTH>();
        let iv = random_bytes::<IV_LENGTH>();
        let key = derive_envelope_key(&secret, &salt);

        let cipher = EnvelopeCipher::new_from_slice(&key[..])
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(
                Nonce::<U16>::from_slice(&iv),
                Payload {
                    msg: &plaintext[..],
                    aad: classification.as_str().as_bytes(),
                },
            )
            .map_err(|e| Error::Encryption(e.to_string()))?;

        Ok(EncryptedEnvelope {
            ciphertext: STANDARD.encode(ciphertext),
            iv: hex::encode(iv),
            salt: hex::encode(salt),
            timestamp: self.clock.now_ms(),
            classification,
        })
    }

    /// Decrypt an envelope and parse its JSON payload
    pub fn decrypt<T: DeserializeOwned>(&self, envelope: &EncryptedEnvelope) -> Result<T> {
        let plaintext = self.open(envelope)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| Error::Decryption(format!("payload is not valid JSON: {}", e)))
    }

    /// Decrypt into an untyped JSON value
    pub fn decrypt_value(&self, envelope: &EncryptedEnvelope) -> Result<serde_json::Value> {
        self.decrypt(envelope)
    }

    fn open(&self, envelope: &EncryptedEnvelope) -> Result<Zeroizing<Vec<u8>>> {
        let secret = self.keystore.master_secret()?;

        let salt = hex::decode(&envelope.salt)
            .map_err(|e| Error::Decryption(format!("malformed salt: {}", e)))?;
        let iv = hex::decode(&envelope.iv)
            .map_err(|e| Error::Decryption(format!("malformed iv: {}", e)))?;
        let ciphertext = STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| Error::Decryption(format!("malformed ciphertext: {}", e)))?;

        if salt.len() != SALT_LENGTH || iv.len() != IV_LENGTH {
            return Err(Error::Decryption(format!(
                "parameter mismatch: salt {} bytes, iv {} bytes",
                salt.len(),
                iv.len()
            )));
        }

        let key = derive_envelope_key(&secret, &salt);
        let cipher = EnvelopeCipher::new_from_slice(&key[..])
            .map_err(|e| Error::Decryption(e.to_string()))?;

        let plaintext = cipher
            .decrypt(
                Nonce::<U16>::from_slice(&iv),
                Payload {
                    msg: &ciphertext[..],
                    aad: envelope.classification.as_str().as_bytes(),
                },
            )
            .map_err(|_| {
                tracing::warn!(
                    "Envelope authentication failed (classification={})",
                    envelope.classification
                );
                Error::Decryption("authentication failed".to_string())
            })?;

        Ok(Zeroizing::new(plaintext))
    }
}
