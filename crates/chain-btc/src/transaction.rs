//! Transaction model: outpoints, inputs, outputs, the consensus wire codec,
//! and a builder that locks structure at finalize time.

use crypto_utils::hashes::sha256d;

use crate::encode::{write_compact_size, write_var_bytes, Reader};
use crate::error::BtcError;
use crate::script::Script;

/// Total currency cap in satoshis (21 million BTC).
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Default sequence: opts in to replace-by-fee, no locktime constraint.
pub const SEQUENCE_RBF: u32 = 0xFFFF_FFFD;

/// A reference to a previous transaction output.
///
/// `txid` is stored in internal (little-endian) byte order; display order is
/// the reverse, as printed by explorers and RPC interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// Parse a display-order (big-endian) hex txid.
    pub fn from_display_txid(txid_hex: &str, vout: u32) -> Result<Self, BtcError> {
        let bytes = hex::decode(txid_hex)
            .map_err(|e| BtcError::InvalidTransaction(format!("invalid txid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(BtcError::InvalidTransaction(format!(
                "txid must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut txid = [0u8; 32];
        for (i, &b) in bytes.iter().rev().enumerate() {
            txid[i] = b;
        }
        Ok(OutPoint { txid, vout })
    }

    /// Hex txid in display order.
    pub fn display_txid(&self) -> String {
        let mut reversed = self.txid;
        reversed.reverse();
        hex::encode(reversed)
    }
}

/// A transaction input: outpoint reference plus unlocking data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    /// Segwit witness stack; empty for non-witness inputs.
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(previous_output: OutPoint) -> Self {
        TxIn {
            previous_output,
            script_sig: Script::new(),
            sequence: SEQUENCE_RBF,
            witness: Vec::new(),
        }
    }
}

/// A transaction output: amount and destination script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Script,
}

/// A Bitcoin transaction. Once produced by [`TransactionBuilder::finalize`]
/// or decoded from wire bytes it is treated as immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub lock_time: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    /// Whether any input carries witness data.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| !i.witness.is_empty())
    }

    /// Consensus serialization. Uses the segwit marker/flag framing exactly
    /// when witness data is present.
    pub fn serialize(&self) -> Vec<u8> {
        self.serialize_inner(self.has_witness())
    }

    /// Serialization without witness data (the txid preimage, and the form
    /// embedded in PSBTs).
    pub fn serialize_without_witness(&self) -> Vec<u8> {
        self.serialize_inner(false)
    }

    fn serialize_inner(&self, with_witness: bool) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.version.to_le_bytes());
        if with_witness {
            buf.push(0x00); // marker
            buf.push(0x01); // flag
        }
        write_compact_size(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.previous_output.txid);
            buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_var_bytes(&mut buf, input.script_sig.as_bytes());
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut buf, output.script_pubkey.as_bytes());
        }
        if with_witness {
            for input in &self.inputs {
                write_compact_size(&mut buf, input.witness.len() as u64);
                for item in &input.witness {
                    write_var_bytes(&mut buf, item);
                }
            }
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// Decode a consensus-serialized transaction. Trailing bytes are an
    /// error; the codec round-trips bit-exactly.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BtcError> {
        let mut r = Reader::new(bytes);
        let tx = Self::read(&mut r)?;
        if !r.is_empty() {
            return Err(BtcError::InvalidTransaction(format!(
                "{} trailing bytes after transaction",
                r.remaining()
            )));
        }
        Ok(tx)
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, BtcError> {
        let version = r.read_u32_le()?;

        let mut input_count = r.read_compact_size()?;
        let mut segwit = false;
        if input_count == 0 {
            // Marker byte: a legal legacy tx cannot have zero inputs here.
            let flag = r.read_u8()?;
            if flag != 0x01 {
                return Err(BtcError::InvalidTransaction(format!(
                    "invalid segwit flag 0x{flag:02x}"
                )));
            }
            segwit = true;
            input_count = r.read_compact_size()?;
        }

        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            let txid = r.read_array::<32>()?;
            let vout = r.read_u32_le()?;
            let script_sig = Script::from_bytes(r.read_var_bytes()?);
            let sequence = r.read_u32_le()?;
            inputs.push(TxIn {
                previous_output: OutPoint { txid, vout },
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let output_count = r.read_compact_size()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            let value = r.read_u64_le()?;
            let script_pubkey = Script::from_bytes(r.read_var_bytes()?);
            outputs.push(TxOut {
                value,
                script_pubkey,
            });
        }

        if segwit {
            for input in &mut inputs {
                let item_count = r.read_compact_size()?;
                let mut witness = Vec::with_capacity(item_count.min(32) as usize);
                for _ in 0..item_count {
                    witness.push(r.read_var_bytes()?);
                }
                input.witness = witness;
            }
            // A tx with no witness data must use legacy framing; accepting
            // the marker form here would break bit-exact round-trips.
            if inputs.iter().all(|i| i.witness.is_empty()) {
                return Err(BtcError::InvalidTransaction(
                    "segwit framing without witness data".into(),
                ));
            }
        }

        let lock_time = r.read_u32_le()?;
        Ok(Transaction {
            version,
            lock_time,
            inputs,
            outputs,
        })
    }

    /// Transaction id: double SHA-256 of the witness-stripped serialization,
    /// in internal byte order.
    pub fn txid(&self) -> [u8; 32] {
        sha256d(&self.serialize_without_witness())
    }

    /// Witness transaction id: double SHA-256 of the full serialization.
    pub fn wtxid(&self) -> [u8; 32] {
        sha256d(&self.serialize())
    }

    /// Hex txid in display order.
    pub fn display_txid(&self) -> String {
        let mut id = self.txid();
        id.reverse();
        hex::encode(id)
    }

    /// Sum of output values, guarding against overflow past MAX_MONEY.
    pub fn total_output_value(&self) -> Result<u64, BtcError> {
        let mut total: u64 = 0;
        for output in &self.outputs {
            total = total
                .checked_add(output.value)
                .filter(|&t| t <= MAX_MONEY)
                .ok_or(BtcError::AmountOverflow)?;
        }
        Ok(total)
    }
}

/// Incremental transaction assembly.
///
/// Inputs and outputs keep insertion order; nothing is reordered. Amounts
/// are validated as they are added and the structure is locked by
/// [`finalize`](Self::finalize), which hands back an immutable
/// [`Transaction`] with empty unlocking data.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    version: u32,
    lock_time: u32,
    inputs: Vec<TxIn>,
    outputs: Vec<TxOut>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        TransactionBuilder {
            version: 2,
            lock_time: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    /// Add an input spending `outpoint` with the default RBF sequence.
    pub fn add_input(&mut self, outpoint: OutPoint) -> &mut Self {
        self.inputs.push(TxIn::new(outpoint));
        self
    }

    /// Add an input with an explicit sequence number.
    pub fn add_input_with_sequence(&mut self, outpoint: OutPoint, sequence: u32) -> &mut Self {
        let mut input = TxIn::new(outpoint);
        input.sequence = sequence;
        self.inputs.push(input);
        self
    }

    /// Add an output paying `amount` satoshis to `script_pubkey`.
    ///
    /// The amount is taken signed so that caller arithmetic errors surface
    /// as `NegativeAmount` instead of wrapping; values beyond MAX_MONEY, in
    /// a single output or in aggregate, are `AmountOverflow`.
    pub fn add_output(&mut self, amount: i64, script_pubkey: Script) -> Result<&mut Self, BtcError> {
        if amount < 0 {
            return Err(BtcError::NegativeAmount(amount));
        }
        let amount = amount as u64;
        if amount > MAX_MONEY {
            return Err(BtcError::AmountOverflow);
        }
        let running: u64 = self.outputs.iter().map(|o| o.value).sum();
        if running + amount > MAX_MONEY {
            return Err(BtcError::AmountOverflow);
        }
        self.outputs.push(TxOut {
            value: amount,
            script_pubkey,
        });
        Ok(self)
    }

    /// Lock the structure. Fails with `EmptyTransaction` when there are no
    /// inputs or no outputs.
    pub fn finalize(self) -> Result<Transaction, BtcError> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(BtcError::EmptyTransaction);
        }
        Ok(Transaction {
            version: self.version,
            lock_time: self.lock_time,
            inputs: self.inputs,
            outputs: self.outputs,
        })
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
