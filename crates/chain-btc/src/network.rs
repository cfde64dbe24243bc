use serde::{Deserialize, Serialize};

/// Supported Bitcoin networks.
///
/// Supplies the version bytes and human-readable prefixes consumed by the
/// address encoder and WIF codec. Signet shares testnet's encoding
/// parameters, so decoded testnet strings may belong to either network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    /// Version byte for base58check P2PKH addresses.
    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet | Network::Signet | Network::Regtest => 0x6F,
        }
    }

    /// Version byte for base58check P2SH addresses.
    pub fn p2sh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet | Network::Signet | Network::Regtest => 0xC4,
        }
    }

    /// Prefix byte for WIF-encoded private keys.
    pub fn wif_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet | Network::Signet | Network::Regtest => 0xEF,
        }
    }

    /// Human-readable part for bech32 segwit addresses.
    pub fn bech32_hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "bc",
            Network::Testnet | Network::Signet => "tb",
            Network::Regtest => "bcrt",
        }
    }

    /// Look up the network for a base58check P2PKH version byte.
    pub fn from_p2pkh_version(version: u8) -> Option<Network> {
        match version {
            0x00 => Some(Network::Mainnet),
            0x6F => Some(Network::Testnet),
            _ => None,
        }
    }

    /// Look up the network for a base58check P2SH version byte.
    pub fn from_p2sh_version(version: u8) -> Option<Network> {
        match version {
            0x05 => Some(Network::Mainnet),
            0xC4 => Some(Network::Testnet),
            _ => None,
        }
    }

    /// Look up the network for a bech32 human-readable part.
    pub fn from_bech32_hrp(hrp: &str) -> Option<Network> {
        match hrp {
            "bc" => Some(Network::Mainnet),
            "tb" => Some(Network::Testnet),
            "bcrt" => Some(Network::Regtest),
            _ => None,
        }
    }

    /// Look up the network for a WIF prefix byte.
    pub fn from_wif_prefix(prefix: u8) -> Option<Network> {
        match prefix {
            0x80 => Some(Network::Mainnet),
            0xEF => Some(Network::Testnet),
            _ => None,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Signet => write!(f, "signet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}
