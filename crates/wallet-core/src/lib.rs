//! HD wallet engine: BIP-39 mnemonics and seeds, BIP-32 extended keys, and
//! a facade over the Bitcoin engine in `chain-btc` for addresses and PSBT
//! signing.
//!
//! The functions here are thin compositions of the underlying modules;
//! anything stateful (the PSBT being signed) is owned by the caller.

pub mod derivation_path;
pub mod error;
pub mod extended_key;
pub mod mnemonic;
pub mod seed_encryption;

pub use derivation_path::{ChildNumber, DerivationPath};
pub use error::WalletError;
pub use extended_key::{Xprv, Xpub};
pub use mnemonic::Seed;
pub use seed_encryption::EncryptedSeed;

use chain_btc::address::Address;
use chain_btc::network::Network;
use chain_btc::psbt::Psbt;
use chain_btc::transaction::Transaction;

/// Generate a new 24-word BIP-39 mnemonic from OS entropy.
pub fn generate_mnemonic() -> Result<String, WalletError> {
    mnemonic::generate_mnemonic()
}

/// Whether `phrase` is a valid English mnemonic.
pub fn validate_mnemonic(phrase: &str) -> bool {
    mnemonic::validate_mnemonic(phrase)
}

/// Derive the 64-byte seed from a mnemonic and passphrase.
pub fn seed_from_mnemonic(phrase: &str, passphrase: &str) -> Result<Seed, WalletError> {
    mnemonic::seed_from_mnemonic(phrase, passphrase)
}

/// Derive a seed directly from raw entropy bytes.
pub fn seed_from_entropy(entropy: &[u8]) -> Result<Seed, WalletError> {
    mnemonic::seed_from_entropy(entropy)
}

/// The BIP-32 master private key for a seed.
pub fn master_xprv(seed: &Seed, network: Network) -> Result<Xprv, WalletError> {
    Xprv::new_master(seed.as_bytes(), network)
}

/// Derive the extended private key at `path` (e.g. `m/84'/0'/0'/0/0`).
pub fn derive_xprv(seed: &Seed, path: &str, network: Network) -> Result<Xprv, WalletError> {
    let path: DerivationPath = path.parse()?;
    master_xprv(seed, network)?.derive_path(&path)
}

/// Native segwit (BIP-84) receive address for `account` and `index`.
pub fn receive_address(
    seed: &Seed,
    network: Network,
    account: u32,
    index: u32,
) -> Result<String, WalletError> {
    let coin = match network {
        Network::Mainnet => 0,
        _ => 1,
    };
    let path = format!("m/84'/{coin}'/{account}'/0/{index}");
    let xprv = derive_xprv(seed, &path, network)?;
    let address = Address::p2wpkh(&xprv.public_key(), network);
    address.encode().map_err(WalletError::from)
}

/// Encrypt a seed under a password (Argon2id + AES-256-GCM).
pub fn encrypt_seed(seed: &Seed, password: &str) -> Result<EncryptedSeed, WalletError> {
    seed_encryption::encrypt_seed(seed, password)
}

/// Decrypt a password-sealed seed.
pub fn decrypt_seed(encrypted: &EncryptedSeed, password: &str) -> Result<Seed, WalletError> {
    seed_encryption::decrypt_seed(encrypted, password)
}

/// Sign one PSBT input with the key at `path`.
pub fn sign_psbt_input(
    psbt: &mut Psbt,
    input_index: usize,
    seed: &Seed,
    path: &str,
    network: Network,
) -> Result<(), WalletError> {
    let xprv = derive_xprv(seed, path, network)?;
    chain_btc::signer::sign_input(psbt, input_index, xprv.private_key())?;
    Ok(())
}

/// Finalize a fully signed PSBT into a broadcast-ready transaction.
pub fn finalize_psbt(psbt: &Psbt) -> Result<Transaction, WalletError> {
    chain_btc::signer::finalize(psbt).map_err(WalletError::from)
}
