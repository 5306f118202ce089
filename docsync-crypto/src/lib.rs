//! Credential encryption for docsync.
//!
//! Remote secrets (WebDAV passwords, S3 secret keys, git tokens) are stored
//! encrypted at rest as `ivHex:cipherHex` strings:
//! - ChaCha20-Poly1305 authenticated encryption
//! - A 32-byte key derived deterministically from the configured secret
//! - A fresh random nonce per call, prepended so decryption is self-contained
//!
//! No key rotation or versioning is modeled.

mod error;
mod vault;

pub use error::{CryptoError, CryptoResult};
pub use vault::{CredentialVault, KEY_SIZE, NONCE_SIZE};
