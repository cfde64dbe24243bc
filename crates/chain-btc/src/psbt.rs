//! Partially signed transactions and their key-value wire format.
//!
//! A [`Psbt`] carries an unsigned transaction plus per-input metadata:
//! the spent output, the scripts needed to sign, and signatures collected
//! so far. The codec implements the BIP-174 framing for the key types the
//! engine acts on; everything else (derivation origins, proprietary
//! fields) is carried opaquely per map and re-emitted on serialization,
//! so documents produced by other wallets survive a round trip.

use std::collections::BTreeMap;

use crate::encode::{write_compact_size, write_var_bytes, Reader};
use crate::error::BtcError;
use crate::script::Script;
use crate::sighash::SighashType;
use crate::transaction::{Transaction, TxOut};

const MAGIC: &[u8; 5] = b"psbt\xff";

const GLOBAL_UNSIGNED_TX: u8 = 0x00;

const IN_WITNESS_UTXO: u8 = 0x01;
const IN_PARTIAL_SIG: u8 = 0x02;
const IN_SIGHASH_TYPE: u8 = 0x03;
const IN_REDEEM_SCRIPT: u8 = 0x04;
const IN_WITNESS_SCRIPT: u8 = 0x05;
const IN_FINAL_SCRIPT_SIG: u8 = 0x07;
const IN_FINAL_WITNESS: u8 = 0x08;

/// Signing metadata for one transaction input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsbtInput {
    /// The output being spent. Required before signing.
    pub witness_utxo: Option<TxOut>,
    /// Redeem script for P2SH spends.
    pub redeem_script: Option<Script>,
    /// Witness script for P2WSH spends.
    pub witness_script: Option<Script>,
    /// Sighash flag the signers agreed on; SIGHASH_ALL when absent.
    pub sighash_type: Option<SighashType>,
    /// Collected signatures keyed by compressed public key. The map is
    /// ordered and deduplicating, so re-signing with the same key is a
    /// no-op and serialization order is canonical.
    pub partial_sigs: BTreeMap<[u8; 33], Vec<u8>>,
    /// Finalized unlocking script, once assembled.
    pub final_script_sig: Option<Script>,
    /// Finalized witness stack, once assembled.
    pub final_script_witness: Option<Vec<Vec<u8>>>,
    /// Entries the engine does not act on, keyed by the full key bytes
    /// (type byte included). Preserved across the wire so cosigners'
    /// metadata is never dropped.
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl PsbtInput {
    /// Whether the input carries final unlocking data.
    pub fn is_final(&self) -> bool {
        self.final_script_sig.is_some() || self.final_script_witness.is_some()
    }

    /// The sighash type to sign with, defaulting to SIGHASH_ALL.
    pub fn sighash(&self) -> SighashType {
        self.sighash_type.unwrap_or(SighashType::ALL)
    }
}

/// Metadata for one transaction output. The engine acts on none of the
/// output fields, so everything is carried opaquely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PsbtOutput {
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

/// A partially signed transaction document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Psbt {
    pub unsigned_tx: Transaction,
    /// One entry per transaction input, index-aligned.
    pub inputs: Vec<PsbtInput>,
    /// One entry per transaction output, index-aligned.
    pub outputs: Vec<PsbtOutput>,
    /// Global entries outside the modeled set.
    pub unknown: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Psbt {
    /// Wrap an unsigned transaction. Every input must have an empty
    /// scriptSig and witness; unlocking data lives in the per-input maps
    /// until finalization.
    pub fn from_unsigned_tx(tx: Transaction) -> Result<Self, BtcError> {
        if tx
            .inputs
            .iter()
            .any(|i| !i.script_sig.is_empty() || !i.witness.is_empty())
        {
            return Err(BtcError::InvalidPsbt(
                "unsigned transaction carries unlocking data".into(),
            ));
        }
        let inputs = vec![PsbtInput::default(); tx.inputs.len()];
        let outputs = vec![PsbtOutput::default(); tx.outputs.len()];
        Ok(Psbt {
            unsigned_tx: tx,
            inputs,
            outputs,
            unknown: BTreeMap::new(),
        })
    }

    /// Serialize to the key-value wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(MAGIC);

        // Global map.
        write_key(&mut buf, GLOBAL_UNSIGNED_TX, &[]);
        write_var_bytes(&mut buf, &self.unsigned_tx.serialize_without_witness());
        write_unknown(&mut buf, &self.unknown);
        buf.push(0x00);

        for input in &self.inputs {
            if let Some(utxo) = &input.witness_utxo {
                write_key(&mut buf, IN_WITNESS_UTXO, &[]);
                let mut value = Vec::with_capacity(9 + utxo.script_pubkey.len());
                value.extend_from_slice(&utxo.value.to_le_bytes());
                write_var_bytes(&mut value, utxo.script_pubkey.as_bytes());
                write_var_bytes(&mut buf, &value);
            }
            for (pubkey, sig) in &input.partial_sigs {
                write_key(&mut buf, IN_PARTIAL_SIG, pubkey);
                write_var_bytes(&mut buf, sig);
            }
            if let Some(ty) = input.sighash_type {
                write_key(&mut buf, IN_SIGHASH_TYPE, &[]);
                write_var_bytes(&mut buf, &(ty.to_byte() as u32).to_le_bytes());
            }
            if let Some(script) = &input.redeem_script {
                write_key(&mut buf, IN_REDEEM_SCRIPT, &[]);
                write_var_bytes(&mut buf, script.as_bytes());
            }
            if let Some(script) = &input.witness_script {
                write_key(&mut buf, IN_WITNESS_SCRIPT, &[]);
                write_var_bytes(&mut buf, script.as_bytes());
            }
            if let Some(script) = &input.final_script_sig {
                write_key(&mut buf, IN_FINAL_SCRIPT_SIG, &[]);
                write_var_bytes(&mut buf, script.as_bytes());
            }
            if let Some(witness) = &input.final_script_witness {
                write_key(&mut buf, IN_FINAL_WITNESS, &[]);
                let mut value = Vec::new();
                write_compact_size(&mut value, witness.len() as u64);
                for item in witness {
                    write_var_bytes(&mut value, item);
                }
                write_var_bytes(&mut buf, &value);
            }
            write_unknown(&mut buf, &input.unknown);
            buf.push(0x00);
        }

        for output in &self.outputs {
            write_unknown(&mut buf, &output.unknown);
            buf.push(0x00);
        }
        buf
    }

    /// Decode the key-value wire format.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BtcError> {
        let mut r = Reader::new(bytes);
        let magic = r
            .read_bytes(5)
            .map_err(|_| BtcError::InvalidPsbt("missing magic".into()))?;
        if magic != MAGIC {
            return Err(BtcError::InvalidPsbt("bad magic".into()));
        }

        let mut unsigned_tx = None;
        let mut global_unknown = BTreeMap::new();
        for (key, value) in read_map(&mut r)? {
            match key.split_first() {
                Some((&GLOBAL_UNSIGNED_TX, [])) => {
                    if unsigned_tx.is_some() {
                        return Err(duplicate(GLOBAL_UNSIGNED_TX));
                    }
                    let tx = Transaction::deserialize(&value)?;
                    if tx.has_witness() {
                        return Err(BtcError::InvalidPsbt(
                            "unsigned transaction carries witness data".into(),
                        ));
                    }
                    unsigned_tx = Some(tx);
                }
                Some(_) => {
                    global_unknown.insert(key, value);
                }
                None => return Err(BtcError::InvalidPsbt("empty key".into())),
            }
        }
        let unsigned_tx =
            unsigned_tx.ok_or_else(|| BtcError::InvalidPsbt("missing unsigned transaction".into()))?;

        let mut inputs = Vec::with_capacity(unsigned_tx.inputs.len());
        for _ in 0..unsigned_tx.inputs.len() {
            inputs.push(read_input_map(&mut r)?);
        }
        let mut outputs = Vec::with_capacity(unsigned_tx.outputs.len());
        for _ in 0..unsigned_tx.outputs.len() {
            let unknown = read_map(&mut r)?.into_iter().collect();
            outputs.push(PsbtOutput { unknown });
        }
        if !r.is_empty() {
            return Err(BtcError::InvalidPsbt(format!(
                "{} trailing bytes",
                r.remaining()
            )));
        }
        let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)?;
        psbt.inputs = inputs;
        psbt.outputs = outputs;
        psbt.unknown = global_unknown;
        Ok(psbt)
    }
}

fn write_key(buf: &mut Vec<u8>, key_type: u8, key_data: &[u8]) {
    write_compact_size(buf, 1 + key_data.len() as u64);
    buf.push(key_type);
    buf.extend_from_slice(key_data);
}

fn write_unknown(buf: &mut Vec<u8>, unknown: &BTreeMap<Vec<u8>, Vec<u8>>) {
    for (key, value) in unknown {
        write_var_bytes(buf, key);
        write_var_bytes(buf, value);
    }
}

/// Read key-value pairs up to the 0x00 map separator.
fn read_map(r: &mut Reader<'_>) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BtcError> {
    let mut entries = Vec::new();
    loop {
        let key = r
            .read_var_bytes()
            .map_err(|_| BtcError::InvalidPsbt("truncated map".into()))?;
        if key.is_empty() {
            return Ok(entries);
        }
        let value = r
            .read_var_bytes()
            .map_err(|_| BtcError::InvalidPsbt("truncated map value".into()))?;
        if entries.iter().any(|(k, _)| *k == key) {
            return Err(BtcError::InvalidPsbt(format!(
                "duplicate key 0x{}",
                hex::encode(&key)
            )));
        }
        entries.push((key, value));
    }
}

fn read_input_map(r: &mut Reader<'_>) -> Result<PsbtInput, BtcError> {
    let mut input = PsbtInput::default();
    for (key, value) in read_map(r)? {
        let (&key_type, key_data) = key
            .split_first()
            .ok_or_else(|| BtcError::InvalidPsbt("empty key".into()))?;
        match key_type {
            IN_WITNESS_UTXO => {
                expect_bare_key(key_type, key_data)?;
                let mut vr = Reader::new(&value);
                let amount = vr.read_u64_le()?;
                let script_pubkey = Script::from_bytes(vr.read_var_bytes()?);
                if !vr.is_empty() {
                    return Err(BtcError::InvalidPsbt("trailing bytes in utxo".into()));
                }
                input.witness_utxo = Some(TxOut {
                    value: amount,
                    script_pubkey,
                });
            }
            IN_PARTIAL_SIG => {
                let pubkey: [u8; 33] = key_data.try_into().map_err(|_| {
                    BtcError::InvalidPsbt(format!(
                        "partial signature key must be a 33-byte pubkey, got {}",
                        key_data.len()
                    ))
                })?;
                input.partial_sigs.insert(pubkey, value);
            }
            IN_SIGHASH_TYPE => {
                expect_bare_key(key_type, key_data)?;
                let raw: [u8; 4] = value.as_slice().try_into().map_err(|_| {
                    BtcError::InvalidPsbt("sighash type must be 4 bytes".into())
                })?;
                let raw = u32::from_le_bytes(raw);
                let byte = u8::try_from(raw)
                    .map_err(|_| BtcError::UnsupportedFormat(format!("sighash flag {raw:#x}")))?;
                input.sighash_type = Some(SighashType::from_byte(byte)?);
            }
            IN_REDEEM_SCRIPT => {
                expect_bare_key(key_type, key_data)?;
                input.redeem_script = Some(Script::from_bytes(value));
            }
            IN_WITNESS_SCRIPT => {
                expect_bare_key(key_type, key_data)?;
                input.witness_script = Some(Script::from_bytes(value));
            }
            IN_FINAL_SCRIPT_SIG => {
                expect_bare_key(key_type, key_data)?;
                input.final_script_sig = Some(Script::from_bytes(value));
            }
            IN_FINAL_WITNESS => {
                expect_bare_key(key_type, key_data)?;
                let mut vr = Reader::new(&value);
                let count = vr.read_compact_size()?;
                let mut witness = Vec::with_capacity(count.min(32) as usize);
                for _ in 0..count {
                    witness.push(vr.read_var_bytes()?);
                }
                if !vr.is_empty() {
                    return Err(BtcError::InvalidPsbt("trailing bytes in witness".into()));
                }
                input.final_script_witness = Some(witness);
            }
            _ => {
                input.unknown.insert(key, value);
            }
        }
    }
    Ok(input)
}

fn expect_bare_key(key_type: u8, key_data: &[u8]) -> Result<(), BtcError> {
    if key_data.is_empty() {
        Ok(())
    } else {
        Err(BtcError::InvalidPsbt(format!(
            "key type 0x{key_type:02x} takes no key data"
        )))
    }
}

fn duplicate(key_type: u8) -> BtcError {
    BtcError::InvalidPsbt(format!("duplicate key 0x{key_type:02x}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, TransactionBuilder};

    fn unsigned_tx() -> Transaction {
        let mut b = TransactionBuilder::new();
        b.add_input(OutPoint::new([0x11; 32], 0));
        b.add_input(OutPoint::new([0x22; 32], 3));
        b.add_output(90_000, Script::p2wpkh(&[0x33; 20])).unwrap();
        b.finalize().unwrap()
    }

    fn sample_psbt() -> Psbt {
        let mut psbt = Psbt::from_unsigned_tx(unsigned_tx()).unwrap();
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: 50_000,
            script_pubkey: Script::p2wpkh(&[0x44; 20]),
        });
        psbt.inputs[0].partial_sigs.insert([0x02; 33], vec![0x30, 0x44, 0x01]);
        psbt.inputs[1].witness_utxo = Some(TxOut {
            value: 60_000,
            script_pubkey: Script::p2sh(&[0x55; 20]),
        });
        psbt.inputs[1].redeem_script = Some(Script::p2wpkh(&[0x66; 20]));
        psbt.inputs[1].sighash_type = Some(SighashType::ALL);
        psbt
    }

    #[test]
    fn from_unsigned_tx_creates_aligned_inputs() {
        let psbt = Psbt::from_unsigned_tx(unsigned_tx()).unwrap();
        assert_eq!(psbt.inputs.len(), 2);
        assert_eq!(psbt.inputs[0], PsbtInput::default());
    }

    #[test]
    fn from_unsigned_tx_rejects_unlocking_data() {
        let mut tx = unsigned_tx();
        tx.inputs[0].script_sig = Script::from_bytes(vec![0x00]);
        assert!(matches!(
            Psbt::from_unsigned_tx(tx),
            Err(BtcError::InvalidPsbt(_))
        ));

        let mut tx = unsigned_tx();
        tx.inputs[1].witness = vec![vec![0x01]];
        assert!(Psbt::from_unsigned_tx(tx).is_err());
    }

    #[test]
    fn wire_roundtrip() {
        let psbt = sample_psbt();
        let bytes = psbt.serialize();
        assert_eq!(&bytes[..5], b"psbt\xff");
        let decoded = Psbt::deserialize(&bytes).unwrap();
        assert_eq!(decoded, psbt);
    }

    #[test]
    fn roundtrip_with_final_fields() {
        let mut psbt = sample_psbt();
        psbt.inputs[0].final_script_witness =
            Some(vec![vec![0x30, 0x45, 0x01], vec![0x02; 33]]);
        psbt.inputs[1].final_script_sig = Some(Script::from_bytes(vec![0x01, 0xAB]));
        let decoded = Psbt::deserialize(&psbt.serialize()).unwrap();
        assert_eq!(decoded, psbt);
    }

    #[test]
    fn partial_sigs_are_idempotent_and_ordered() {
        let mut psbt = Psbt::from_unsigned_tx(unsigned_tx()).unwrap();
        psbt.inputs[0].partial_sigs.insert([0x03; 33], vec![0x01]);
        psbt.inputs[0].partial_sigs.insert([0x02; 33], vec![0x02]);
        psbt.inputs[0].partial_sigs.insert([0x03; 33], vec![0x01]);
        assert_eq!(psbt.inputs[0].partial_sigs.len(), 2);
        // BTreeMap iterates in key order regardless of insertion order.
        let keys: Vec<_> = psbt.inputs[0].partial_sigs.keys().collect();
        assert!(keys[0] < keys[1]);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = sample_psbt().serialize();
        bytes[0] = b'q';
        assert!(matches!(
            Psbt::deserialize(&bytes),
            Err(BtcError::InvalidPsbt(_))
        ));
    }

    #[test]
    fn truncated_document_rejected() {
        let bytes = sample_psbt().serialize();
        assert!(Psbt::deserialize(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = sample_psbt().serialize();
        bytes.push(0x00);
        assert!(Psbt::deserialize(&bytes).is_err());
    }

    #[test]
    fn unrecognized_entries_survive_roundtrip() {
        let mut psbt = sample_psbt();
        // A BIP32 derivation entry (type 0x06) keyed by a pubkey, plus a
        // proprietary global entry and an output entry.
        let mut derivation_key = vec![0x06];
        derivation_key.extend_from_slice(&[0x02; 33]);
        psbt.inputs[0]
            .unknown
            .insert(derivation_key.clone(), vec![0xAA; 12]);
        psbt.unknown.insert(vec![0xFC, 0x01], vec![0x07]);
        psbt.outputs[0].unknown.insert(vec![0x42], vec![0x01, 0x02]);

        let decoded = Psbt::deserialize(&psbt.serialize()).unwrap();
        assert_eq!(decoded, psbt);
        assert_eq!(
            decoded.inputs[0].unknown.get(&derivation_key),
            Some(&vec![0xAA; 12])
        );
    }

    #[test]
    fn foreign_derivation_entry_decodes() {
        // An input map entry another wallet wrote: type 0x06, a 33-byte
        // pubkey in the key, a fingerprint-and-path value.
        let psbt = Psbt::from_unsigned_tx(unsigned_tx()).unwrap();
        let mut bytes = psbt.serialize();
        let insert_at = bytes.len() - 3; // inside the first input map
        let mut entry = vec![34, 0x06];
        entry.extend_from_slice(&[0x03; 33]);
        entry.extend_from_slice(&[4, 0xDE, 0xAD, 0xBE, 0xEF]);
        bytes.splice(insert_at..insert_at, entry);

        let decoded = Psbt::deserialize(&bytes).unwrap();
        assert_eq!(decoded.inputs[0].unknown.len(), 1);
        assert!(decoded.inputs[1].unknown.is_empty());
        // The entry is written back out on serialization.
        assert_eq!(Psbt::deserialize(&decoded.serialize()).unwrap(), decoded);
    }

    #[test]
    fn duplicate_key_rejected() {
        // A global map carrying the unsigned transaction twice.
        let tx_bytes = unsigned_tx().serialize_without_witness();
        let mut doc = Vec::new();
        doc.extend_from_slice(b"psbt\xff");
        for _ in 0..2 {
            write_key(&mut doc, GLOBAL_UNSIGNED_TX, &[]);
            write_var_bytes(&mut doc, &tx_bytes);
        }
        doc.push(0x00);
        assert!(Psbt::deserialize(&doc).is_err());
    }

    #[test]
    fn sighash_type_survives_roundtrip() {
        let mut psbt = Psbt::from_unsigned_tx(unsigned_tx()).unwrap();
        psbt.inputs[0].sighash_type = Some(SighashType::from_byte(0x83).unwrap());
        let decoded = Psbt::deserialize(&psbt.serialize()).unwrap();
        assert_eq!(decoded.inputs[0].sighash_type, Some(SighashType::from_byte(0x83).unwrap()));
        assert_eq!(decoded.inputs[1].sighash(), SighashType::ALL);
    }
}
