//! Key resolution: env value, key file, or generate-on-first-run.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{CryptoError, CryptoResult};
use crate::secretbox::KEY_LEN;

/// Resolve the encryption key.
///
/// Order: `env_key` (base64, from `STIGMER_ENCRYPTION_KEY`), then the raw
/// bytes of `key_path`, then a freshly generated key written to
/// `key_path` with mode 0600.
///
/// # Errors
///
/// Returns an error when a provided key has the wrong length or encoding,
/// or when the key file cannot be read or written.
pub fn resolve_key(env_key: Option<&str>, key_path: &Path) -> CryptoResult<[u8; KEY_LEN]> {
    if let Some(encoded) = env_key {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::BadKeyEncoding(e.to_string()))?;
        return key_from_bytes(&bytes);
    }

    if key_path.exists() {
        let bytes = std::fs::read(key_path).map_err(|source| CryptoError::KeyFile {
            path: key_path.display().to_string(),
            source,
        })?;
        return key_from_bytes(&bytes);
    }

    let key = crate::SecretBox::generate_key();
    write_key_file(key_path, &key)?;
    Ok(key)
}

fn key_from_bytes(bytes: &[u8]) -> CryptoResult<[u8; KEY_LEN]> {
    <[u8; KEY_LEN]>::try_from(bytes).map_err(|_| CryptoError::BadKeyLength {
        expected: KEY_LEN,
        actual: bytes.len(),
    })
}

fn write_key_file(path: &Path, key: &[u8; KEY_LEN]) -> CryptoResult<()> {
    let as_key_file_error = |source: std::io::Error| CryptoError::KeyFile {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(as_key_file_error)?;
    }
    std::fs::write(path, key).map_err(as_key_file_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(as_key_file_error)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encryption.key");
        let key = crate::SecretBox::generate_key();
        let encoded = BASE64.encode(key);

        let resolved = resolve_key(Some(&encoded), &path).unwrap();
        assert_eq!(resolved, key);
        // Env-provided keys are never written to disk.
        assert!(!path.exists());
    }

    #[test]
    fn bad_env_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encryption.key");
        assert!(matches!(
            resolve_key(Some("not base64!"), &path),
            Err(CryptoError::BadKeyEncoding(_))
        ));
        let short = BASE64.encode([0u8; 16]);
        assert!(matches!(
            resolve_key(Some(&short), &path),
            Err(CryptoError::BadKeyLength { actual: 16, .. })
        ));
    }

    #[test]
    fn generates_and_reuses_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys/encryption.key");

        let first = resolve_key(None, &path).unwrap();
        assert!(path.exists());
        let second = resolve_key(None, &path).unwrap();
        assert_eq!(first, second);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn corrupt_key_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encryption.key");
        std::fs::write(&path, b"short").unwrap();
        assert!(matches!(
            resolve_key(None, &path),
            Err(CryptoError::BadKeyLength { actual: 5, .. })
        ));
    }
}
