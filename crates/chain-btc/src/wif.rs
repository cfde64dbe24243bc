//! Wallet import format for raw secp256k1 private keys.
//!
//! A WIF string is base58check over a network prefix byte, the 32-byte key,
//! and an optional 0x01 suffix marking the key as paired with a compressed
//! public key.

use crate::error::BtcError;
use crate::network::Network;

/// Encode a private key as a WIF string.
pub fn encode_wif(key: &[u8; 32], network: Network, compressed: bool) -> String {
    let mut data = Vec::with_capacity(34);
    data.push(network.wif_prefix());
    data.extend_from_slice(key);
    if compressed {
        data.push(0x01);
    }
    bs58::encode(data).with_check().into_string()
}

/// Decode a WIF string into the private key, its network, and whether it
/// denotes a compressed public key.
pub fn decode_wif(s: &str) -> Result<([u8; 32], Network, bool), BtcError> {
    let decoded = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| match e {
            bs58::decode::Error::InvalidChecksum { .. } => BtcError::ChecksumMismatch,
            other => BtcError::InvalidPrivateKey(format!("base58 decoding failed: {other}")),
        })?;
    let (prefix, rest) = decoded
        .split_first()
        .ok_or_else(|| BtcError::InvalidPrivateKey("empty payload".into()))?;
    let network = Network::from_wif_prefix(*prefix)
        .ok_or_else(|| BtcError::UnsupportedFormat(format!("unknown WIF prefix 0x{prefix:02x}")))?;
    let (key_bytes, compressed) = match rest.len() {
        32 => (rest, false),
        33 if rest[32] == 0x01 => (&rest[..32], true),
        33 => {
            return Err(BtcError::InvalidPrivateKey(format!(
                "invalid compression marker 0x{:02x}",
                rest[32]
            )))
        }
        n => {
            return Err(BtcError::InvalidPrivateKey(format!(
                "key payload must be 32 or 33 bytes, got {n}"
            )))
        }
    };
    let mut key = [0u8; 32];
    key.copy_from_slice(key_bytes);
    Ok((key, network, compressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_uncompressed_mainnet_vector() {
        let key = [0x11u8; 32];
        let wif = encode_wif(&key, Network::Mainnet, false);
        let (decoded, network, compressed) = decode_wif(&wif).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(network, Network::Mainnet);
        assert!(!compressed);
        assert!(wif.starts_with('5'));
    }

    #[test]
    fn compressed_mainnet_prefix() {
        let wif = encode_wif(&[0x22u8; 32], Network::Mainnet, true);
        assert!(wif.starts_with('K') || wif.starts_with('L'));
        let (_, _, compressed) = decode_wif(&wif).unwrap();
        assert!(compressed);
    }

    #[test]
    fn testnet_roundtrip() {
        let key = [0xAB; 32];
        for compressed in [false, true] {
            let wif = encode_wif(&key, Network::Testnet, compressed);
            let (decoded, network, c) = decode_wif(&wif).unwrap();
            assert_eq!(decoded, key);
            assert_eq!(network, Network::Testnet);
            assert_eq!(c, compressed);
        }
    }

    #[test]
    fn sec_key_one_well_known_wif() {
        let mut key = [0u8; 32];
        key[31] = 1;
        assert_eq!(
            encode_wif(&key, Network::Mainnet, true),
            "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn"
        );
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut wif = encode_wif(&[0x33u8; 32], Network::Mainnet, true).into_bytes();
        wif.swap(10, 12);
        let s = String::from_utf8(wif).unwrap();
        assert!(matches!(
            decode_wif(&s),
            Err(BtcError::ChecksumMismatch) | Err(BtcError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn bad_compression_marker_rejected() {
        let mut data = vec![Network::Mainnet.wif_prefix()];
        data.extend_from_slice(&[0x44u8; 32]);
        data.push(0x02);
        let s = bs58::encode(data).with_check().into_string();
        assert!(matches!(
            decode_wif(&s),
            Err(BtcError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn unknown_prefix_rejected() {
        let mut data = vec![0x42];
        data.extend_from_slice(&[0x55u8; 32]);
        let s = bs58::encode(data).with_check().into_string();
        assert!(matches!(decode_wif(&s), Err(BtcError::UnsupportedFormat(_))));
    }
}
