//! AES-256-GCM encryption of credentials at rest.
//!
//! OAuth tokens and document server secrets are sealed before they reach the
//! database. Output is base64 `nonce || ciphertext || tag`, stored in TEXT
//! columns.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ciphertext is not valid base64")]
    Encoding,

    #[error("ciphertext too short")]
    Truncated,

    #[error("encryption failed")]
    Seal,

    #[error("decryption failed")]
    Open,
}

/// Seals and opens secrets with a key derived from a passphrase.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl SecretBox {
    /// Derive a 32-byte key from `passphrase` with SHA-256.
    pub fn new(passphrase: &str) -> Self {
        let key = Sha256::digest(passphrase.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Seal)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(&combined))
    }

    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let combined = STANDARD.decode(sealed).map_err(|_| CryptoError::Encoding)?;
        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Truncated);
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Open)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Open)
    }

    /// Seal `value` unless it is empty; empty stays empty so unset fields
    /// remain distinguishable in storage.
    pub fn seal_optional(&self, value: &str) -> Result<String, CryptoError> {
        if value.is_empty() {
            Ok(String::new())
        } else {
            self.seal(value)
        }
    }

    pub fn open_optional(&self, sealed: &str) -> Result<String, CryptoError> {
        if sealed.is_empty() {
            Ok(String::new())
        } else {
            self.open(sealed)
        }
    }
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}
