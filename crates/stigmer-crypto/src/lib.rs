//! Stigmer Crypto - secret encryption for Environment values.
//!
//! Secret values are AES-256-GCM ciphertexts stored as
//! `base64(nonce || ciphertext || tag)` with a fresh 12-byte nonce per
//! encryption. The 32-byte key resolves in order: the
//! `STIGMER_ENCRYPTION_KEY` env value (base64), the key file
//! (`~/.stigmer/encryption.key`, raw bytes), or a fresh key generated and
//! written to the key file with mode 0600.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod keyfile;
mod secretbox;

pub use error::{CryptoError, CryptoResult};
pub use keyfile::resolve_key;
pub use secretbox::{KEY_LEN, NONCE_LEN, SecretBox};
