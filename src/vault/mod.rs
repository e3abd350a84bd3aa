//! Durable per-client credential storage.
//!
//! Three independent blobs live on disk per client key, all named by the
//! one-way hash of the provider's client id:
//!
//! ```text
//! <data_dir>/<key>_secrets.json      provider client-secrets document
//! <data_dir>/<key>.key               symmetric key for the outstanding stash
//! <data_dir>/credentials-<key>.json  access/refresh tokens after exchange
//! ```
//!
//! Writes are last-writer-wins: a second stash for the same client id
//! rotates the symmetric key and silently orphans the first stash's cookie.
//! The vault keeps no in-memory state between calls.

mod crypto;
mod types;

pub use types::{DecryptedPayload, VaultError};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::identity::ClientKey;

/// File-backed store for secrets, stash keys, and access credentials.
pub struct CredentialVault {
    data_dir: PathBuf,
}

impl CredentialVault {
    /// Open (creating if needed) a vault rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn secrets_path(&self, key: &ClientKey) -> PathBuf {
        self.data_dir.join(format!("{}_secrets.json", key))
    }

    fn stash_key_path(&self, key: &ClientKey) -> PathBuf {
        self.data_dir.join(format!("{}.key", key))
    }

    fn credentials_path(&self, key: &ClientKey) -> PathBuf {
        self.data_dir.join(format!("credentials-{}.json", key))
    }

    /// Persist the provider secrets document verbatim, overwriting any
    /// prior document for this client key.
    pub fn store_secrets(&self, key: &ClientKey, document: &str) -> Result<(), VaultError> {
        fs::write(self.secrets_path(key), document)?;
        Ok(())
    }

    /// Read back the persisted secrets document.
    pub fn load_secrets(&self, key: &ClientKey) -> Result<String, VaultError> {
        match fs::read_to_string(self.secrets_path(key)) {
            Ok(doc) => Ok(doc),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(VaultError::SecretsNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of a previously issued access-credentials blob.
    /// Absence means there is nothing to clean up, which is fine.
    pub fn delete_credentials(&self, key: &ClientKey) -> Result<(), VaultError> {
        match fs::remove_file(self.credentials_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Encrypt `plaintext` under a freshly generated key, persisting the
    /// key (and overwriting any previous one) so exactly the next matching
    /// decrypt can succeed. Returns `iv || ciphertext`.
    pub fn encrypt(&self, key: &ClientKey, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let stash_key = crypto::generate_key();
        fs::write(self.stash_key_path(key), &stash_key)?;
        crypto::encrypt(&stash_key, plaintext)
    }

    /// Decrypt a stash cookie using the key persisted for `key`.
    pub fn decrypt(
        &self,
        key: &ClientKey,
        ciphertext: &[u8],
    ) -> Result<DecryptedPayload, VaultError> {
        let stash_key = match fs::read(self.stash_key_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VaultError::KeyNotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let plaintext = crypto::decrypt(&stash_key, ciphertext)?;
        // A rotated key can unpad to garbage that happens to pass the
        // padding check; garbage is still a decrypt failure here.
        DecryptedPayload::from_bytes(plaintext).map_err(|_| {
            VaultError::DecryptFailure("recovered bytes are not valid UTF-8".to_string())
        })
    }

    /// Persist the result of a completed authorization exchange. Returns
    /// the on-disk path so it can be handed to the cluster tools.
    pub fn store_access_credentials(
        &self,
        key: &ClientKey,
        token_document: &str,
    ) -> Result<PathBuf, VaultError> {
        let path = self.credentials_path(key);
        fs::write(&path, token_document)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::client_key;

    fn test_vault() -> (tempfile::TempDir, CredentialVault) {
        let dir = tempfile::tempdir().unwrap();
        let vault = CredentialVault::new(dir.path()).unwrap();
        (dir, vault)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (_dir, vault) = test_vault();
        let key = client_key("abc123");
        let payload = b"{\"email\":\"admin@example.com\",\"max_nodes\":4}";

        let ciphertext = vault.encrypt(&key, payload).unwrap();
        let recovered = vault.decrypt(&key, &ciphertext).unwrap();
        assert_eq!(recovered.expose().as_bytes(), payload);
    }

    #[test]
    fn decrypt_without_encrypt_is_key_not_found() {
        let (_dir, vault) = test_vault();
        let key = client_key("never-stashed");
        let err = vault.decrypt(&key, &[0u8; 32]).unwrap_err();
        assert!(matches!(err, VaultError::KeyNotFound(_)));
    }

    #[test]
    fn second_encrypt_orphans_first_ciphertext() {
        let (_dir, vault) = test_vault();
        let key = client_key("abc123");

        let first = vault.encrypt(&key, b"first submission").unwrap();
        let second = vault.encrypt(&key, b"second submission").unwrap();

        // The first cookie raced with the key rotation and must fail
        // cleanly, while the second still decrypts.
        let err = vault.decrypt(&key, &first).unwrap_err();
        assert!(matches!(err, VaultError::DecryptFailure(_)));
        assert_eq!(vault.decrypt(&key, &second).unwrap().expose(), "second submission");
    }

    #[test]
    fn secrets_store_and_load() {
        let (_dir, vault) = test_vault();
        let key = client_key("abc123");
        let doc = r#"{"web":{"client_id":"abc123"}}"#;

        vault.store_secrets(&key, doc).unwrap();
        assert_eq!(vault.load_secrets(&key).unwrap(), doc);

        // Overwrite is idempotent.
        vault.store_secrets(&key, doc).unwrap();
        assert_eq!(vault.load_secrets(&key).unwrap(), doc);
    }

    #[test]
    fn load_secrets_missing_is_typed() {
        let (_dir, vault) = test_vault();
        let err = vault.load_secrets(&client_key("nobody")).unwrap_err();
        assert!(matches!(err, VaultError::SecretsNotFound(_)));
    }

    #[test]
    fn delete_credentials_is_quiet_when_absent() {
        let (_dir, vault) = test_vault();
        let key = client_key("abc123");
        vault.delete_credentials(&key).unwrap();

        let path = vault
            .store_access_credentials(&key, r#"{"access_token":"t"}"#)
            .unwrap();
        assert!(path.exists());
        vault.delete_credentials(&key).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn distinct_clients_do_not_share_keys() {
        let (_dir, vault) = test_vault();
        let alice = client_key("alice");
        let bob = client_key("bob");

        let ciphertext = vault.encrypt(&alice, b"alice's submission").unwrap();
        // Bob has no stash key at all.
        assert!(matches!(
            vault.decrypt(&bob, &ciphertext).unwrap_err(),
            VaultError::KeyNotFound(_)
        ));
    }
}
