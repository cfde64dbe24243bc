//! # crypto-utils
//!
//! Hashing, encryption, key derivation, memory safety, and secure random
//! generation utilities shared by the wallet engine crates.

pub mod encryption;
pub mod error;
pub mod hashes;
pub mod kdf;
pub mod random;
pub mod zeroizing;

pub use error::CryptoError;
