//! AES-256-GCM secret box.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes (GCM standard).
pub const NONCE_LEN: usize = 12;

/// Encrypts and decrypts secret environment values.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

impl SecretBox {
    /// Create a box from a 32-byte key.
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Generate a fresh random key.
    #[must_use]
    pub fn generate_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Encrypt a plaintext value to `base64(nonce || ciphertext || tag)`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encrypt`] if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(packed))
    }

    /// Decrypt a `base64(nonce || ciphertext || tag)` value.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Ciphertext`] when the value is malformed,
    /// was encrypted under a different key, or has been tampered with.
    pub fn decrypt(&self, encoded: &str) -> CryptoResult<String> {
        let packed = BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::Ciphertext(format!("invalid base64: {e}")))?;
        if packed.len() <= NONCE_LEN {
            return Err(CryptoError::Ciphertext("value too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = packed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Ciphertext("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Ciphertext(format!("invalid utf-8: {e}")))
    }
}
