use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};

use crate::error::CryptoError;

/// AES-256-GCM key size in bytes.
const KEY_SIZE: usize = 32;

/// AES-256-GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

/// Encrypt `plaintext` with AES-256-GCM under a 32-byte `key`.
///
/// A fresh random 12-byte nonce is generated per call and prepended to the
/// ciphertext: `[nonce (12) | ciphertext | tag (16)]`. Fails with
/// `InvalidKeyLength` if the key is not exactly 32 bytes.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = check_key(key)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data produced by [`encrypt`] under the same key.
///
/// The inverse law `decrypt(key, encrypt(key, pt)) == pt` holds for every
/// 32-byte key and plaintext. Tag verification failure surfaces as
/// `DecryptionFailed`.
pub fn decrypt(key: &[u8], ciphertext_with_nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = check_key(key)?;
    if ciphertext_with_nonce.len() < NONCE_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "ciphertext too short: expected at least {} bytes, got {}",
            NONCE_SIZE,
            ciphertext_with_nonce.len()
        )));
    }

    let (nonce_bytes, ciphertext) = ciphertext_with_nonce.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

fn check_key(key: &[u8]) -> Result<&[u8], CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            got: key.len(),
        });
    }
    Ok(key)
}
