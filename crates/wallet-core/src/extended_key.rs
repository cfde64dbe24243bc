//! BIP-32 extended keys.
//!
//! [`Xprv`] and [`Xpub`] carry the derivation metadata (depth, parent
//! fingerprint, child number, chain code) alongside the key itself, and
//! serialize to the base58check `xprv`/`xpub` form (`tprv`/`tpub` on test
//! networks). The capability split is in the types: only `Xprv` can take
//! hardened steps or sign, and non-hardened public derivation commutes with
//! `to_xpub`.

use chain_btc::network::Network;
use crypto_utils::hashes::{hash160, hmac_sha512};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::{Field, PrimeField};
use k256::{ProjectivePoint, PublicKey, Scalar};
use zeroize::Zeroize;

use crate::derivation_path::{ChildNumber, DerivationPath};
use crate::error::WalletError;

const VERSION_XPRV: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];
const VERSION_XPUB: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
const VERSION_TPRV: [u8; 4] = [0x04, 0x35, 0x83, 0x94];
const VERSION_TPUB: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

const SERIALIZED_LEN: usize = 78;

/// An extended private key.
pub struct Xprv {
    network: Network,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    key: [u8; 32],
}

impl Xprv {
    /// Master key from seed bytes: HMAC-SHA512 keyed with "Bitcoin seed",
    /// left half the key, right half the chain code.
    pub fn new_master(seed: &[u8], network: Network) -> Result<Self, WalletError> {
        if seed.len() < 16 || seed.len() > 64 {
            return Err(WalletError::InvalidSeed(format!(
                "seed must be 16..=64 bytes, got {}",
                seed.len()
            )));
        }
        let mut digest = hmac_sha512(b"Bitcoin seed", seed);
        let mut key = [0u8; 32];
        let mut chain_code = [0u8; 32];
        key.copy_from_slice(&digest[..32]);
        chain_code.copy_from_slice(&digest[32..]);
        digest.zeroize();

        // The seed is unusable in the negligible case where the left half
        // is zero or exceeds the curve order.
        if parse_scalar(&key).is_none() {
            key.zeroize();
            return Err(WalletError::InvalidSeed(
                "master key outside the curve order".into(),
            ));
        }
        Ok(Xprv {
            network,
            depth: 0,
            parent_fingerprint: [0; 4],
            child_number: 0,
            chain_code,
            key,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// The step that produced this key from its parent.
    pub fn child_number(&self) -> ChildNumber {
        ChildNumber::from_raw(self.child_number)
    }

    /// Raw 32-byte private key.
    pub fn private_key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Compressed SEC1 public key.
    pub fn public_key(&self) -> [u8; 33] {
        // The key was validated as a scalar at construction.
        let signing = SigningKey::from_bytes(&self.key.into())
            .expect("key validated at construction");
        signing
            .verifying_key()
            .to_sec1_bytes()
            .as_ref()
            .try_into()
            .expect("compressed SEC1 is 33 bytes")
    }

    /// First four bytes of hash160 of the compressed public key.
    pub fn fingerprint(&self) -> [u8; 4] {
        fingerprint_of(&self.public_key())
    }

    /// Derive one child, hardened or not.
    pub fn derive_child(&self, child: ChildNumber) -> Result<Xprv, WalletError> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| WalletError::DerivationFailed("depth exceeds 255".into()))?;
        let raw = child.to_raw();

        let mut data = Vec::with_capacity(37);
        if child.is_hardened() {
            data.push(0x00);
            data.extend_from_slice(&self.key);
        } else {
            data.extend_from_slice(&self.public_key());
        }
        data.extend_from_slice(&raw.to_be_bytes());
        let mut digest = hmac_sha512(&self.chain_code, &data);
        data.zeroize();

        let mut tweak_bytes = [0u8; 32];
        tweak_bytes.copy_from_slice(&digest[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);
        digest.zeroize();

        let tweak = parse_scalar(&tweak_bytes);
        tweak_bytes.zeroize();
        let tweak = tweak
            .ok_or_else(|| WalletError::DerivationFailed("tweak outside the curve order".into()))?;
        let parent =
            parse_scalar(&self.key).ok_or_else(|| WalletError::DerivationFailed("bad key".into()))?;

        let child_scalar = tweak + parent;
        if bool::from(child_scalar.is_zero()) {
            return Err(WalletError::DerivationFailed("derived key is zero".into()));
        }

        Ok(Xprv {
            network: self.network,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: raw,
            chain_code,
            key: child_scalar.to_bytes().into(),
        })
    }

    /// Apply every step of `path` in order.
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Xprv, WalletError> {
        let mut current = self.clone_key();
        for &step in path.steps() {
            current = current.derive_child(step)?;
        }
        Ok(current)
    }

    /// The corresponding extended public key.
    pub fn to_xpub(&self) -> Xpub {
        Xpub {
            network: self.network,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            pubkey: self.public_key(),
        }
    }

    /// Base58check `xprv`/`tprv` form.
    pub fn to_base58(&self) -> String {
        let version = match self.network {
            Network::Mainnet => VERSION_XPRV,
            _ => VERSION_TPRV,
        };
        let mut payload = serialize_common(
            version,
            self.depth,
            self.parent_fingerprint,
            self.child_number,
            &self.chain_code,
        );
        payload.push(0x00);
        payload.extend_from_slice(&self.key);
        let encoded = bs58::encode(&payload).with_check().into_string();
        payload.zeroize();
        encoded
    }

    /// Parse a base58check `xprv`/`tprv` string.
    pub fn from_base58(s: &str) -> Result<Self, WalletError> {
        let (version, body) = decode_extended(s)?;
        let network = match version {
            VERSION_XPRV => Network::Mainnet,
            VERSION_TPRV => Network::Testnet,
            VERSION_XPUB | VERSION_TPUB => {
                return Err(WalletError::InvalidExtendedKey(
                    "expected a private key, found a public key".into(),
                ))
            }
            _ => {
                return Err(WalletError::InvalidExtendedKey(format!(
                    "unknown version {}",
                    hex::encode(version)
                )))
            }
        };
        let (depth, parent_fingerprint, child_number, chain_code, key_bytes) = split_body(&body);
        if key_bytes[0] != 0x00 {
            return Err(WalletError::InvalidExtendedKey(
                "private key must be padded with 0x00".into(),
            ));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes[1..]);
        if parse_scalar(&key).is_none() {
            key.zeroize();
            return Err(WalletError::InvalidExtendedKey(
                "key outside the curve order".into(),
            ));
        }
        Ok(Xprv {
            network,
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            key,
        })
    }

    fn clone_key(&self) -> Xprv {
        Xprv {
            network: self.network,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            key: self.key,
        }
    }
}

impl Drop for Xprv {
    fn drop(&mut self) {
        self.key.zeroize();
        self.chain_code.zeroize();
    }
}

impl std::fmt::Debug for Xprv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("Xprv")
            .field("network", &self.network)
            .field("depth", &self.depth)
            .field("child_number", &self.child_number())
            .finish_non_exhaustive()
    }
}

/// An extended public key. Derives non-hardened children only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xpub {
    network: Network,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    pubkey: [u8; 33],
}

impl Xpub {
    pub fn network(&self) -> Network {
        self.network
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> ChildNumber {
        ChildNumber::from_raw(self.child_number)
    }

    /// Compressed SEC1 public key.
    pub fn public_key(&self) -> &[u8; 33] {
        &self.pubkey
    }

    pub fn fingerprint(&self) -> [u8; 4] {
        fingerprint_of(&self.pubkey)
    }

    /// Derive one non-hardened child. Hardened steps need the private key.
    pub fn derive_child(&self, child: ChildNumber) -> Result<Xpub, WalletError> {
        if child.is_hardened() {
            return Err(WalletError::HardenedDerivationRequiresPrivateKey);
        }
        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| WalletError::DerivationFailed("depth exceeds 255".into()))?;
        let raw = child.to_raw();

        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&self.pubkey);
        data.extend_from_slice(&raw.to_be_bytes());
        let digest = hmac_sha512(&self.chain_code, &data);

        let mut tweak_bytes = [0u8; 32];
        tweak_bytes.copy_from_slice(&digest[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);

        let tweak = parse_scalar(&tweak_bytes)
            .ok_or_else(|| WalletError::DerivationFailed("tweak outside the curve order".into()))?;
        let parent = PublicKey::from_sec1_bytes(&self.pubkey)
            .map_err(|e| WalletError::DerivationFailed(format!("bad parent key: {e}")))?;

        let child_point = ProjectivePoint::GENERATOR * tweak + parent.to_projective();
        if child_point == ProjectivePoint::IDENTITY {
            return Err(WalletError::DerivationFailed(
                "derived point is the identity".into(),
            ));
        }
        let encoded = child_point.to_affine().to_encoded_point(true);
        let pubkey: [u8; 33] = encoded
            .as_bytes()
            .try_into()
            .map_err(|_| WalletError::DerivationFailed("unexpected SEC1 length".into()))?;

        Ok(Xpub {
            network: self.network,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: raw,
            chain_code,
            pubkey,
        })
    }

    /// Apply every step of `path` in order; fails on the first hardened step.
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Xpub, WalletError> {
        let mut current = self.clone();
        for &step in path.steps() {
            current = current.derive_child(step)?;
        }
        Ok(current)
    }

    /// Base58check `xpub`/`tpub` form.
    pub fn to_base58(&self) -> String {
        let version = match self.network {
            Network::Mainnet => VERSION_XPUB,
            _ => VERSION_TPUB,
        };
        let mut payload = serialize_common(
            version,
            self.depth,
            self.parent_fingerprint,
            self.child_number,
            &self.chain_code,
        );
        payload.extend_from_slice(&self.pubkey);
        bs58::encode(payload).with_check().into_string()
    }

    /// Parse a base58check `xpub`/`tpub` string.
    pub fn from_base58(s: &str) -> Result<Self, WalletError> {
        let (version, body) = decode_extended(s)?;
        let network = match version {
            VERSION_XPUB => Network::Mainnet,
            VERSION_TPUB => Network::Testnet,
            VERSION_XPRV | VERSION_TPRV => {
                return Err(WalletError::InvalidExtendedKey(
                    "expected a public key, found a private key".into(),
                ))
            }
            _ => {
                return Err(WalletError::InvalidExtendedKey(format!(
                    "unknown version {}",
                    hex::encode(version)
                )))
            }
        };
        let (depth, parent_fingerprint, child_number, chain_code, key_bytes) = split_body(&body);
        let pubkey: [u8; 33] = key_bytes
            .try_into()
            .map_err(|_| WalletError::InvalidExtendedKey("bad key length".into()))?;
        PublicKey::from_sec1_bytes(&pubkey)
            .map_err(|e| WalletError::InvalidExtendedKey(format!("bad public key: {e}")))?;
        Ok(Xpub {
            network,
            depth,
            parent_fingerprint,
            child_number,
            chain_code,
            pubkey,
        })
    }
}

fn parse_scalar(bytes: &[u8; 32]) -> Option<Scalar> {
    let scalar: Option<Scalar> = Scalar::from_repr((*bytes).into()).into();
    scalar.filter(|s| !bool::from(s.is_zero()))
}

fn fingerprint_of(pubkey: &[u8; 33]) -> [u8; 4] {
    let hash = hash160(pubkey);
    [hash[0], hash[1], hash[2], hash[3]]
}

fn serialize_common(
    version: [u8; 4],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: &[u8; 32],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(SERIALIZED_LEN);
    payload.extend_from_slice(&version);
    payload.push(depth);
    payload.extend_from_slice(&parent_fingerprint);
    payload.extend_from_slice(&child_number.to_be_bytes());
    payload.extend_from_slice(chain_code);
    payload
}

fn decode_extended(s: &str) -> Result<([u8; 4], [u8; SERIALIZED_LEN - 4]), WalletError> {
    let decoded = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| match e {
            bs58::decode::Error::InvalidChecksum { .. } => {
                WalletError::InvalidExtendedKey("checksum mismatch".into())
            }
            other => WalletError::InvalidExtendedKey(format!("base58 decoding failed: {other}")),
        })?;
    if decoded.len() != SERIALIZED_LEN {
        return Err(WalletError::InvalidExtendedKey(format!(
            "payload must be {SERIALIZED_LEN} bytes, got {}",
            decoded.len()
        )));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&decoded[..4]);
    let mut body = [0u8; SERIALIZED_LEN - 4];
    body.copy_from_slice(&decoded[4..]);
    Ok((version, body))
}

fn split_body(body: &[u8; SERIALIZED_LEN - 4]) -> (u8, [u8; 4], u32, [u8; 32], [u8; 33]) {
    let depth = body[0];
    let mut parent_fingerprint = [0u8; 4];
    parent_fingerprint.copy_from_slice(&body[1..5]);
    let child_number = u32::from_be_bytes([body[5], body[6], body[7], body[8]]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&body[9..41]);
    let mut key = [0u8; 33];
    key.copy_from_slice(&body[41..]);
    (depth, parent_fingerprint, child_number, chain_code, key)
}
