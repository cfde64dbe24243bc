//! Bitcoin transaction engine for the wallet.
//!
//! Provides address encoding/decoding, script construction and evaluation,
//! sighash computation, wire-exact transaction serialization, PSBT
//! collaborative-signing state, and deterministic ECDSA signing. Everything
//! here is a pure, synchronous computation over owned values; the crate
//! performs no I/O and never generates its own randomness.

pub mod address;
pub mod encode;
pub mod error;
pub mod interpreter;
pub mod network;
pub mod psbt;
pub mod script;
pub mod sighash;
pub mod signer;
pub mod transaction;
pub mod wif;

pub use error::BtcError;
