//! Stable file-system keys for opaque client identifiers.
//!
//! The client id found in a provider secrets document names every artifact
//! the vault persists for that account. It is user-supplied content, so it
//! never touches the file system directly; a one-way digest of it does.

use std::fmt;

use sha2::{Digest, Sha256};

/// A hex-encoded digest of a client identifier, safe to use in file names.
///
/// Deterministic across restarts and never reversible back to the
/// identifier it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the [`ClientKey`] for an opaque client identifier.
pub fn client_key(client_id: &str) -> ClientKey {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    ClientKey(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::client_key;

    #[test]
    fn stable_across_calls() {
        assert_eq!(client_key("abc123"), client_key("abc123"));
    }

    #[test]
    fn distinct_identifiers_distinct_keys() {
        assert_ne!(client_key("abc123"), client_key("abc124"));
    }

    #[test]
    fn key_is_hex_and_fixed_length() {
        let key = client_key("some-client-id.apps.example.com");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_does_not_leak_identifier() {
        let key = client_key("abc123");
        assert!(!key.as_str().contains("abc123"));
    }
}
