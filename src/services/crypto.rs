//! Credential Cipher
//!
//! Encrypts host access tokens at rest with AES-256-GCM. Ciphertexts are
//! stored as base64(nonce || ciphertext); each encryption draws a fresh
//! random nonce.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Errors that can occur during credential encryption/decryption
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,
}

/// Service for encrypting and decrypting stored access tokens
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build a cipher from a hex-encoded 32-byte key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a plaintext token for storage.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    /// Decrypt a stored ciphertext back into the plaintext token.
    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let combined = STANDARD
            .decode(stored)
            .map_err(|e| CryptoError::InvalidCiphertext(format!("Invalid base64: {e}")))?;
        if combined.len() <= NONCE_LEN {
            return Err(CryptoError::InvalidCiphertext(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::InvalidCiphertext(format!("Invalid UTF-8: {e}")))
    }
}
