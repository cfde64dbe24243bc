//! BIP-39 mnemonic handling and seed generation.

use bip39::{Language, Mnemonic};
use crypto_utils::zeroizing::ZeroizingString;
use zeroize::Zeroize;

use crate::error::WalletError;

/// A 64-byte BIP-39 seed. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; 64]);

impl Seed {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Seed(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Drop for Seed {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("Seed(..)")
    }
}

/// Generate a new 24-word mnemonic from 256 bits of OS entropy.
pub fn generate_mnemonic() -> Result<String, WalletError> {
    let mut entropy = crypto_utils::random::random_bytes_fixed::<32>();
    let phrase = mnemonic_from_entropy(&entropy);
    entropy.zeroize();
    phrase
}

/// Build a mnemonic phrase from caller-supplied entropy.
///
/// BIP-39 accepts 16, 20, 24, 28, or 32 bytes; anything shorter is
/// `InsufficientEntropy`, other lengths are `InvalidEntropy`.
pub fn mnemonic_from_entropy(entropy: &[u8]) -> Result<String, WalletError> {
    if entropy.len() < 16 {
        return Err(WalletError::InsufficientEntropy { got: entropy.len() });
    }
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|e| WalletError::InvalidEntropy(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Whether `phrase` is a well-formed English mnemonic with a valid checksum.
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Derive the 64-byte seed from a mnemonic and an optional passphrase.
pub fn seed_from_mnemonic(phrase: &str, passphrase: &str) -> Result<Seed, WalletError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(map_bip39_error)?;
    Ok(Seed(mnemonic.to_seed_normalized(passphrase)))
}

/// Derive a seed directly from entropy: entropy -> mnemonic -> seed, with an
/// empty passphrase.
pub fn seed_from_entropy(entropy: &[u8]) -> Result<Seed, WalletError> {
    let phrase = ZeroizingString::new(mnemonic_from_entropy(entropy)?);
    seed_from_mnemonic(&phrase, "")
}

fn map_bip39_error(e: bip39::Error) -> WalletError {
    match e {
        bip39::Error::InvalidChecksum => WalletError::InvalidChecksum,
        other => WalletError::InvalidWordlist(other.to_string()),
    }
}

/// The English word list, for input completion.
pub fn word_list() -> &'static [&'static str] {
    Language::English.word_list()
}

/// Whether a single word appears in the English word list.
pub fn is_valid_word(word: &str) -> bool {
    Language::English.find_word(word).is_some()
}
