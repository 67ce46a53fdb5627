//! Crypto error types.

/// Errors from secret encryption and key management.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The key is not 32 bytes.
    #[error("encryption key must be {expected} bytes, got {actual}")]
    BadKeyLength {
        /// Required length.
        expected: usize,
        /// Observed length.
        actual: usize,
    },

    /// The key could not be decoded from base64.
    #[error("encryption key is not valid base64: {0}")]
    BadKeyEncoding(String),

    /// Key file I/O failed.
    #[error("key file {path}: {source}")]
    KeyFile {
        /// Path of the key file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A ciphertext could not be decoded or authenticated.
    #[error("ciphertext rejected: {0}")]
    Ciphertext(String),

    /// Encryption itself failed.
    #[error("encryption failed")]
    Encrypt,
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
