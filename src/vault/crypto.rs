//! Cipher primitive for the stash cookie.
//!
//! AES-256-CBC with PKCS#7 padding and a random IV prepended to the
//! ciphertext. The padding scheme is unambiguous for every input length,
//! including payloads that are already a multiple of the block size.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::vault::types::VaultError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the AES-256 key in bytes.
pub(crate) const KEY_SIZE: usize = 32;

/// Size of the CBC initialization vector in bytes.
pub(crate) const IV_SIZE: usize = 16;

/// Generate fresh random key material for one stash.
pub(crate) fn generate_key() -> Vec<u8> {
    let mut key = vec![0u8; KEY_SIZE];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut key);
    key
}

/// Encrypt `plaintext` under `key`. Returns `iv || ciphertext`.
pub(crate) fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
    let mut iv = [0u8; IV_SIZE];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv)
        .map_err(|e| VaultError::EncryptFailure(format!("bad key material: {}", e)))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `iv || ciphertext` under `key` and strip the padding.
pub(crate) fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, VaultError> {
    if data.len() < IV_SIZE || (data.len() - IV_SIZE) % IV_SIZE != 0 {
        return Err(VaultError::DecryptFailure(
            "ciphertext is not a whole number of blocks".to_string(),
        ));
    }
    let (iv, ciphertext) = data.split_at(IV_SIZE);

    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| VaultError::DecryptFailure(format!("bad key material: {}", e)))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::DecryptFailure("padding check failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = generate_key();
        let plaintext = b"{\"email\":\"admin@example.com\"}";
        let encrypted = encrypt(&key, plaintext).unwrap();
        assert_ne!(&encrypted[IV_SIZE..], plaintext.as_slice());
        assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn roundtrip_empty_payload() {
        let key = generate_key();
        let encrypted = encrypt(&key, b"").unwrap();
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"");
    }

    #[test]
    fn roundtrip_block_aligned_payload() {
        let key = generate_key();
        // Exactly two blocks; the pad must still strip cleanly.
        let plaintext = [0x41u8; 32];
        let encrypted = encrypt(&key, &plaintext).unwrap();
        assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn trailing_spaces_survive() {
        let key = generate_key();
        let plaintext = b"password ends in spaces   ";
        let encrypted = encrypt(&key, plaintext).unwrap();
        assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails() {
        let key = generate_key();
        let other = generate_key();
        let encrypted = encrypt(&key, b"payload").unwrap();
        assert!(decrypt(&other, &encrypted).is_err());
    }

    #[test]
    fn truncated_input_fails() {
        let key = generate_key();
        let encrypted = encrypt(&key, b"payload").unwrap();
        assert!(decrypt(&key, &encrypted[..IV_SIZE + 3]).is_err());
        assert!(decrypt(&key, &encrypted[..4]).is_err());
    }
}
