//! Password-based seed encryption: Argon2id key derivation feeding
//! AES-256-GCM. The salt rides alongside the ciphertext so decryption only
//! needs the password.

use crypto_utils::zeroizing::ZeroizingBytes;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::mnemonic::Seed;

/// An encrypted seed plus the KDF salt it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSeed {
    pub ciphertext: Vec<u8>,
    pub salt: Vec<u8>,
}

/// Encrypt a seed under a password.
///
/// A fresh random salt is drawn per call, so encrypting the same seed twice
/// yields unrelated ciphertexts.
pub fn encrypt_seed(seed: &Seed, password: &str) -> Result<EncryptedSeed, WalletError> {
    let salt = crypto_utils::kdf::generate_salt();
    let mut key = crypto_utils::kdf::derive_key(password.as_bytes(), &salt)?;
    let result = crypto_utils::encryption::encrypt(&key, seed.as_bytes());
    key.zeroize();
    let ciphertext = result?;
    Ok(EncryptedSeed {
        ciphertext,
        salt: salt.to_vec(),
    })
}

/// Decrypt a seed with the password it was sealed under.
///
/// A wrong password fails authentication; it is indistinguishable from a
/// tampered ciphertext.
pub fn decrypt_seed(encrypted: &EncryptedSeed, password: &str) -> Result<Seed, WalletError> {
    let salt: [u8; 16] = encrypted
        .salt
        .as_slice()
        .try_into()
        .map_err(|_| WalletError::DecryptionFailed("salt must be 16 bytes".into()))?;
    let mut key = crypto_utils::kdf::derive_key(password.as_bytes(), &salt)?;
    let result = crypto_utils::encryption::decrypt(&key, &encrypted.ciphertext);
    key.zeroize();
    let plaintext =
        ZeroizingBytes::new(result.map_err(|e| WalletError::DecryptionFailed(e.to_string()))?);

    let seed_bytes: [u8; 64] = plaintext[..].try_into().map_err(|_| {
        WalletError::InvalidSeed(format!("decrypted {} bytes, expected 64", plaintext.len()))
    })?;
    Ok(Seed::from_bytes(seed_bytes))
}

/// JSON form for storage.
pub fn serialize_encrypted_seed(encrypted: &EncryptedSeed) -> Result<String, WalletError> {
    serde_json::to_string(encrypted)
        .map_err(|e| WalletError::EncryptionFailed(format!("serialization failed: {e}")))
}

/// Parse the JSON storage form.
pub fn deserialize_encrypted_seed(json: &str) -> Result<EncryptedSeed, WalletError> {
    serde_json::from_str(json)
        .map_err(|e| WalletError::DecryptionFailed(format!("deserialization failed: {e}")))
}
