//! Vault types for per-client credential storage.
//!
//! Decrypted payloads never appear in Debug output or logs; the only way
//! to read one is an explicit `expose()`.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// A decrypted stash payload, held in secure memory.
pub struct DecryptedPayload {
    value: SecretString,
}

impl DecryptedPayload {
    /// Wrap raw decrypted bytes. The stash payload is serialized JSON, so
    /// anything that is not UTF-8 is a decryption artifact, not data.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, VaultError> {
        let s = String::from_utf8(bytes).map_err(|_| VaultError::InvalidUtf8)?;
        Ok(Self {
            value: SecretString::from(s),
        })
    }

    /// Expose the plaintext. Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.value.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for DecryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecryptedPayload([REDACTED, {} bytes])", self.len())
    }
}

/// Errors that can occur during vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Decrypt was requested but no symmetric key has ever been stored for
    /// this client key, or the key was already consumed and cleaned up.
    #[error("no stash key stored for client key {0}")]
    KeyNotFound(String),

    /// No provider secrets document has been stored for this client key.
    #[error("no provider secrets stored for client key {0}")]
    SecretsNotFound(String),

    /// The ciphertext does not decrypt under the currently stored key,
    /// typically because a later stash rotated the key.
    #[error("decryption failed: {0}")]
    DecryptFailure(String),

    #[error("encryption failed: {0}")]
    EncryptFailure(String),

    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("vault storage error: {0}")]
    Io(#[from] std::io::Error),
}
