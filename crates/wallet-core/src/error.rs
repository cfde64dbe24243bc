use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("word not in the BIP-39 wordlist: {0}")]
    InvalidWordlist(String),

    #[error("mnemonic checksum mismatch")]
    InvalidChecksum,

    #[error("insufficient entropy: got {got} bytes, need at least 16")]
    InsufficientEntropy { got: usize },

    #[error("invalid entropy: {0}")]
    InvalidEntropy(String),

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("derivation index {index} out of range")]
    IndexOutOfRange { index: u32 },

    #[error("hardened derivation requires a private key")]
    HardenedDerivationRequiresPrivateKey,

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("invalid extended key: {0}")]
    InvalidExtendedKey(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),
}

impl From<crypto_utils::CryptoError> for WalletError {
    fn from(e: crypto_utils::CryptoError) -> Self {
        WalletError::EncryptionFailed(e.to_string())
    }
}

impl From<chain_btc::BtcError> for WalletError {
    fn from(e: chain_btc::BtcError) -> Self {
        WalletError::TransactionFailed(e.to_string())
    }
}
