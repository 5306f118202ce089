//! Symmetric encrypt/decrypt of secrets at rest.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Key length required by ChaCha20-Poly1305.
pub const KEY_SIZE: usize = 32;

/// Nonce length; hex-encoded it forms the `ivHex` part of the output.
pub const NONCE_SIZE: usize = 12;

/// Development-only fallback secret. Only used with an explicit opt-in.
const INSECURE_DEFAULT_SECRET: &str = "docsync-insecure-development-secret";

/// Encrypts and decrypts per-unit remote credentials.
#[derive(Clone)]
pub struct CredentialVault {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialVault {
    /// Creates a vault from a configured secret.
    ///
    /// The secret's UTF-8 bytes are zero-padded or truncated to [`KEY_SIZE`].
    pub fn new(secret: &str) -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        let bytes = secret.as_bytes();
        let len = bytes.len().min(KEY_SIZE);
        key[..len].copy_from_slice(&bytes[..len]);
        Self { key }
    }

    /// Creates a vault from optional configuration.
    ///
    /// Without a secret this fails unless `allow_insecure_default` is set, in
    /// which case a well-known development secret is used and a warning is
    /// logged.
    pub fn from_secret(secret: Option<&str>, allow_insecure_default: bool) -> CryptoResult<Self> {
        match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Ok(Self::new(secret)),
            None if allow_insecure_default => {
                warn!(
                    "no credential secret configured; using the insecure development default"
                );
                Ok(Self::new(INSECURE_DEFAULT_SECRET))
            }
            None => Err(CryptoError::MissingSecret),
        }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.key.as_ref()))
    }

    /// Encrypts `plaintext` into `ivHex:cipherHex`.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    /// Decrypts an `ivHex:cipherHex` string produced by [`Self::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> CryptoResult<String> {
        let (iv_hex, cipher_hex) = encoded
            .split_once(':')
            .ok_or_else(|| CryptoError::Decryption("missing ':' separator".to_string()))?;

        let nonce = hex::decode(iv_hex)
            .map_err(|e| CryptoError::Decryption(format!("invalid iv: {e}")))?;
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::Decryption(format!(
                "iv must be {NONCE_SIZE} bytes, got {}",
                nonce.len()
            )));
        }
        let ciphertext = hex::decode(cipher_hex)
            .map_err(|e| CryptoError::Decryption(format!("invalid ciphertext: {e}")))?;

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| {
                CryptoError::Decryption("wrong key or tampered data".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::Decryption(format!("plaintext is not UTF-8: {e}")))
    }
}
