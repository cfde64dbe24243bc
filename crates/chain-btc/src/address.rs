//! Address encoding and decoding.
//!
//! Legacy formats (P2PKH, P2SH) use base58check with a network version
//! byte; segwit v0 formats (P2WPKH, P2WSH) use bech32 with a network HRP.
//! Checksums are always recomputed from the payload, never trusted from the
//! caller, and `decode(encode(x)) == x` for every valid address.

use bech32::{hrp, segwit, Fe32, Hrp};
use crypto_utils::hashes::hash160;

use crate::error::BtcError;
use crate::network::Network;
use crate::script::Script;

/// Supported address formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AddressFormat {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
}

impl AddressFormat {
    /// Required payload length in bytes.
    fn payload_len(self) -> usize {
        match self {
            AddressFormat::P2pkh | AddressFormat::P2sh | AddressFormat::P2wpkh => 20,
            AddressFormat::P2wsh => 32,
        }
    }
}

/// A decoded address: network, format, and the raw hash payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub network: Network,
    pub format: AddressFormat,
    pub payload: Vec<u8>,
}

impl Address {
    pub fn new(network: Network, format: AddressFormat, payload: Vec<u8>) -> Result<Self, BtcError> {
        if payload.len() != format.payload_len() {
            return Err(BtcError::InvalidAddress(format!(
                "{format:?} payload must be {} bytes, got {}",
                format.payload_len(),
                payload.len()
            )));
        }
        Ok(Address {
            network,
            format,
            payload,
        })
    }

    /// P2PKH address for a compressed public key.
    pub fn p2pkh(pubkey: &[u8; 33], network: Network) -> Self {
        Address {
            network,
            format: AddressFormat::P2pkh,
            payload: hash160(pubkey).to_vec(),
        }
    }

    /// P2WPKH (native segwit) address for a compressed public key.
    pub fn p2wpkh(pubkey: &[u8; 33], network: Network) -> Self {
        Address {
            network,
            format: AddressFormat::P2wpkh,
            payload: hash160(pubkey).to_vec(),
        }
    }

    /// P2SH address committing to `redeem_script`.
    pub fn p2sh(redeem_script: &Script, network: Network) -> Self {
        Address {
            network,
            format: AddressFormat::P2sh,
            payload: hash160(redeem_script.as_bytes()).to_vec(),
        }
    }

    /// P2WSH address committing to `witness_script`.
    pub fn p2wsh(witness_script: &Script, network: Network) -> Self {
        Address {
            network,
            format: AddressFormat::P2wsh,
            payload: crypto_utils::hashes::sha256(witness_script.as_bytes()).to_vec(),
        }
    }

    /// Encode to the human-readable string form.
    pub fn encode(&self) -> Result<String, BtcError> {
        encode_address(&self.payload, self.network, self.format)
    }

    /// Decode any supported address string.
    pub fn decode(s: &str) -> Result<Address, BtcError> {
        decode_address(s)
    }

    /// The locking script paying to this address.
    pub fn script_pubkey(&self) -> Script {
        // Payload length is enforced at construction.
        match self.format {
            AddressFormat::P2pkh => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&self.payload);
                Script::p2pkh(&hash)
            }
            AddressFormat::P2sh => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&self.payload);
                Script::p2sh(&hash)
            }
            AddressFormat::P2wpkh => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&self.payload);
                Script::p2wpkh(&hash)
            }
            AddressFormat::P2wsh => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&self.payload);
                Script::p2wsh(&hash)
            }
        }
    }

    /// The address for a locking script, when the script is a standard
    /// single-destination template.
    pub fn from_script_pubkey(script: &Script, network: Network) -> Result<Address, BtcError> {
        use crate::script::ScriptTemplate::*;
        let (format, payload) = match script.classify() {
            P2pkh => (AddressFormat::P2pkh, script.pubkey_hash().map(|h| h.to_vec())),
            P2wpkh => (AddressFormat::P2wpkh, script.pubkey_hash().map(|h| h.to_vec())),
            P2sh => (AddressFormat::P2sh, script.script_hash().map(|h| h.to_vec())),
            P2wsh => (
                AddressFormat::P2wsh,
                script.witness_script_hash().map(|h| h.to_vec()),
            ),
            Multisig { .. } | Raw => {
                return Err(BtcError::UnsupportedFormat(
                    "script has no address form".into(),
                ))
            }
        };
        // classify() guarantees the payload extractors succeed.
        let payload = payload.ok_or_else(|| BtcError::InvalidScript("malformed template".into()))?;
        Ok(Address {
            network,
            format,
            payload,
        })
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.encode() {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

/// Encode a raw payload as an address string.
pub fn encode_address(
    payload: &[u8],
    network: Network,
    format: AddressFormat,
) -> Result<String, BtcError> {
    if payload.len() != format.payload_len() {
        return Err(BtcError::InvalidAddress(format!(
            "{format:?} payload must be {} bytes, got {}",
            format.payload_len(),
            payload.len()
        )));
    }
    match format {
        AddressFormat::P2pkh => Ok(base58check(network.p2pkh_version(), payload)),
        AddressFormat::P2sh => Ok(base58check(network.p2sh_version(), payload)),
        AddressFormat::P2wpkh | AddressFormat::P2wsh => {
            segwit::encode(network_hrp(network), Fe32::Q, payload)
                .map_err(|e| BtcError::InvalidAddress(format!("bech32 encoding failed: {e}")))
        }
    }
}

/// Decode an address string into its network, format, and payload.
pub fn decode_address(s: &str) -> Result<Address, BtcError> {
    // Segwit addresses are recognized by their HRP prefix; everything else
    // goes through base58check.
    let lower = s.to_ascii_lowercase();
    if let Some(hrp_str) = ["bcrt1", "bc1", "tb1"]
        .iter()
        .find(|p| lower.starts_with(**p))
        .map(|p| &p[..p.len() - 1])
    {
        let network = Network::from_bech32_hrp(hrp_str)
            .ok_or_else(|| BtcError::UnsupportedFormat(format!("unknown hrp {hrp_str}")))?;
        let (_, version, program) =
            segwit::decode(s).map_err(|_| BtcError::ChecksumMismatch)?;
        if version != Fe32::Q {
            return Err(BtcError::UnsupportedFormat(format!(
                "unsupported witness version {}",
                version.to_u8()
            )));
        }
        let format = match program.len() {
            20 => AddressFormat::P2wpkh,
            32 => AddressFormat::P2wsh,
            n => {
                return Err(BtcError::UnsupportedFormat(format!(
                    "unsupported witness program length {n}"
                )))
            }
        };
        return Ok(Address {
            network,
            format,
            payload: program,
        });
    }

    let decoded = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|e| match e {
            bs58::decode::Error::InvalidChecksum { .. } => BtcError::ChecksumMismatch,
            other => BtcError::InvalidAddress(format!("base58 decoding failed: {other}")),
        })?;
    if decoded.len() != 21 {
        return Err(BtcError::InvalidAddress(format!(
            "base58 payload must be 21 bytes, got {}",
            decoded.len()
        )));
    }
    let version = decoded[0];
    let payload = decoded[1..].to_vec();
    if let Some(network) = Network::from_p2pkh_version(version) {
        return Ok(Address {
            network,
            format: AddressFormat::P2pkh,
            payload,
        });
    }
    if let Some(network) = Network::from_p2sh_version(version) {
        return Ok(Address {
            network,
            format: AddressFormat::P2sh,
            payload,
        });
    }
    Err(BtcError::UnsupportedFormat(format!(
        "unknown address version byte 0x{version:02x}"
    )))
}

fn base58check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len());
    data.push(version);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

fn network_hrp(network: Network) -> Hrp {
    match network {
        Network::Mainnet => hrp::BC,
        Network::Testnet | Network::Signet => hrp::TB,
        Network::Regtest => hrp::BCRT,
    }
}
