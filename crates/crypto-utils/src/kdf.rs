use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::CryptoError;
use crate::random::random_bytes_fixed;

/// Argon2id memory cost in KiB (64 MiB).
const MEMORY_KIB: u32 = 65536;
/// Argon2id iteration count.
const ITERATIONS: u32 = 3;
/// Argon2id lane count.
const PARALLELISM: u32 = 4;

/// Derive a 32-byte encryption key from `password` and a 16-byte `salt`
/// using Argon2id. Deterministic for a fixed (password, salt) pair; the
/// output is sized for AES-256.
pub fn derive_key(password: &[u8], salt: &[u8; 16]) -> Result<[u8; 32], CryptoError> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, Some(32))
        .map_err(|e| CryptoError::KdfFailed(format!("invalid argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KdfFailed(format!("argon2 hash failed: {e}")))?;
    Ok(output)
}

/// Generate a random 16-byte KDF salt.
pub fn generate_salt() -> [u8; 16] {
    random_bytes_fixed::<16>()
}
