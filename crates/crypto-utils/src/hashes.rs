//! Hash primitives used throughout the wallet engine: single and double
//! SHA-256, HASH160 (SHA-256 then RIPEMD-160), and HMAC-SHA512.

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, the digest used for transaction ids, sighashes, and
/// base58check checksums.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// HASH160: RIPEMD-160 of SHA-256. Used for pubkey hashes and script hashes.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// HMAC-SHA512 keyed by `key` over `data`. The extended-key derivation
/// primitive: the 64-byte output splits into key material and chain code.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    // HMAC accepts keys of any length; new_from_slice cannot fail.
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_input() {
        // Well-known SHA-256 of the empty string.
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256d_is_sha256_of_sha256() {
        let inner = sha256(b"hello");
        assert_eq!(sha256d(b"hello"), sha256(&inner));
    }

    #[test]
    fn sha256d_known_vector() {
        // "hello" double-hashed.
        assert_eq!(
            hex::encode(sha256d(b"hello")),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn hash160_of_generator_pubkey() {
        // Compressed pubkey for secret key 1; hash160 underlies the
        // canonical P2WPKH test address bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4.
        let pubkey = hex::decode(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn hmac_sha512_rfc4231_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let out = hmac_sha512(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(out),
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554\
             9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn hmac_sha512_distinct_keys_distinct_output() {
        assert_ne!(hmac_sha512(b"key-a", b"data"), hmac_sha512(b"key-b", b"data"));
    }
}
