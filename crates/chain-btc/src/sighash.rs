//! Signature-hash computation.
//!
//! Two digest algorithms: the original (legacy) scheme used by P2PKH, P2SH,
//! and bare multisig, and the BIP-143 scheme used by segwit v0 inputs.
//! Both are deterministic functions of the transaction, the input index,
//! the script code, and the [`SighashType`].

use crypto_utils::hashes::sha256d;

use crate::encode::{write_compact_size, write_var_bytes};
use crate::error::BtcError;
use crate::script::Script;
use crate::transaction::Transaction;

/// Which parts of the transaction a signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashBase {
    /// Commit to every input and output.
    All,
    /// Commit to inputs only; outputs are replaceable.
    None,
    /// Commit to the output at the same index as the signed input.
    Single,
}

/// Sighash flag: a base mode plus the ANYONECANPAY modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SighashType {
    pub base: SighashBase,
    pub anyone_can_pay: bool,
}

impl SighashType {
    pub const ALL: SighashType = SighashType {
        base: SighashBase::All,
        anyone_can_pay: false,
    };

    /// The flag byte appended to signatures.
    pub fn to_byte(self) -> u8 {
        let base = match self.base {
            SighashBase::All => 0x01,
            SighashBase::None => 0x02,
            SighashBase::Single => 0x03,
        };
        if self.anyone_can_pay {
            base | 0x80
        } else {
            base
        }
    }

    /// Parse a flag byte. Bits outside the defined set are rejected.
    pub fn from_byte(byte: u8) -> Result<Self, BtcError> {
        let base = match byte & 0x1F {
            0x01 => SighashBase::All,
            0x02 => SighashBase::None,
            0x03 => SighashBase::Single,
            _ => {
                return Err(BtcError::UnsupportedFormat(format!(
                    "unknown sighash flag 0x{byte:02x}"
                )))
            }
        };
        if byte & !0x83 != 0 {
            return Err(BtcError::UnsupportedFormat(format!(
                "unknown sighash flag 0x{byte:02x}"
            )));
        }
        Ok(SighashType {
            base,
            anyone_can_pay: byte & 0x80 != 0,
        })
    }
}

impl Default for SighashType {
    fn default() -> Self {
        SighashType::ALL
    }
}

/// Legacy (pre-segwit) sighash.
///
/// The transaction is reserialized with all scriptSigs cleared except the
/// signed input, which carries `script_code`; the 4-byte flag is appended
/// and the whole preimage double-SHA256d. `Single` with no matching output
/// is rejected rather than reproducing the historical one-byte-hash quirk.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    ty: SighashType,
) -> Result<[u8; 32], BtcError> {
    check_index(tx, input_index)?;
    if ty.base == SighashBase::Single && input_index >= tx.outputs.len() {
        return Err(BtcError::IndexOutOfBounds {
            index: input_index,
            len: tx.outputs.len(),
        });
    }

    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(&tx.version.to_le_bytes());

    // Inputs.
    if ty.anyone_can_pay {
        write_compact_size(&mut buf, 1);
        let input = &tx.inputs[input_index];
        buf.extend_from_slice(&input.previous_output.txid);
        buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
        write_var_bytes(&mut buf, script_code.as_bytes());
        buf.extend_from_slice(&input.sequence.to_le_bytes());
    } else {
        write_compact_size(&mut buf, tx.inputs.len() as u64);
        for (i, input) in tx.inputs.iter().enumerate() {
            buf.extend_from_slice(&input.previous_output.txid);
            buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            if i == input_index {
                write_var_bytes(&mut buf, script_code.as_bytes());
            } else {
                write_compact_size(&mut buf, 0);
            }
            // Other inputs' sequences are zeroed for NONE/SINGLE so they
            // stay replaceable without invalidating this signature.
            let sequence = if i != input_index && ty.base != SighashBase::All {
                0
            } else {
                input.sequence
            };
            buf.extend_from_slice(&sequence.to_le_bytes());
        }
    }

    // Outputs.
    match ty.base {
        SighashBase::All => {
            write_compact_size(&mut buf, tx.outputs.len() as u64);
            for output in &tx.outputs {
                buf.extend_from_slice(&output.value.to_le_bytes());
                write_var_bytes(&mut buf, output.script_pubkey.as_bytes());
            }
        }
        SighashBase::None => {
            write_compact_size(&mut buf, 0);
        }
        SighashBase::Single => {
            // Outputs before the matching one are blanked (value -1, empty
            // script); later ones are dropped.
            write_compact_size(&mut buf, input_index as u64 + 1);
            for _ in 0..input_index {
                buf.extend_from_slice(&(-1i64).to_le_bytes());
                write_compact_size(&mut buf, 0);
            }
            let output = &tx.outputs[input_index];
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut buf, output.script_pubkey.as_bytes());
        }
    }

    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&(ty.to_byte() as u32).to_le_bytes());
    Ok(sha256d(&buf))
}

/// BIP-143 sighash for segwit v0 inputs.
///
/// `script_code` is the P2PKH-style script for P2WPKH spends or the witness
/// script for P2WSH spends; `amount` is the value of the output being
/// spent, which BIP-143 commits to directly.
pub fn segwit_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    amount: u64,
    ty: SighashType,
) -> Result<[u8; 32], BtcError> {
    check_index(tx, input_index)?;
    let input = &tx.inputs[input_index];

    let hash_prevouts = if ty.anyone_can_pay {
        [0u8; 32]
    } else {
        let mut data = Vec::with_capacity(36 * tx.inputs.len());
        for inp in &tx.inputs {
            data.extend_from_slice(&inp.previous_output.txid);
            data.extend_from_slice(&inp.previous_output.vout.to_le_bytes());
        }
        sha256d(&data)
    };

    let hash_sequence = if ty.anyone_can_pay || ty.base != SighashBase::All {
        [0u8; 32]
    } else {
        let mut data = Vec::with_capacity(4 * tx.inputs.len());
        for inp in &tx.inputs {
            data.extend_from_slice(&inp.sequence.to_le_bytes());
        }
        sha256d(&data)
    };

    let hash_outputs = match ty.base {
        SighashBase::All => {
            let mut data = Vec::new();
            for output in &tx.outputs {
                data.extend_from_slice(&output.value.to_le_bytes());
                write_var_bytes(&mut data, output.script_pubkey.as_bytes());
            }
            sha256d(&data)
        }
        SighashBase::Single if input_index < tx.outputs.len() => {
            let output = &tx.outputs[input_index];
            let mut data = Vec::new();
            data.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut data, output.script_pubkey.as_bytes());
            sha256d(&data)
        }
        _ => [0u8; 32],
    };

    let mut buf = Vec::with_capacity(200 + script_code.len());
    buf.extend_from_slice(&tx.version.to_le_bytes());
    buf.extend_from_slice(&hash_prevouts);
    buf.extend_from_slice(&hash_sequence);
    buf.extend_from_slice(&input.previous_output.txid);
    buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
    write_var_bytes(&mut buf, script_code.as_bytes());
    buf.extend_from_slice(&amount.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());
    buf.extend_from_slice(&hash_outputs);
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&(ty.to_byte() as u32).to_le_bytes());
    Ok(sha256d(&buf))
}

fn check_index(tx: &Transaction, input_index: usize) -> Result<(), BtcError> {
    if input_index >= tx.inputs.len() {
        return Err(BtcError::IndexOutOfBounds {
            index: input_index,
            len: tx.inputs.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{OutPoint, Transaction, TxIn, TxOut};

    fn two_in_two_out() -> Transaction {
        Transaction {
            version: 1,
            lock_time: 0,
            inputs: vec![
                TxIn {
                    previous_output: OutPoint::new([0x11; 32], 0),
                    script_sig: Script::new(),
                    sequence: 0xFFFF_FFFF,
                    witness: Vec::new(),
                },
                TxIn {
                    previous_output: OutPoint::new([0x22; 32], 1),
                    script_sig: Script::new(),
                    sequence: 0xFFFF_FFFF,
                    witness: Vec::new(),
                },
            ],
            outputs: vec![
                TxOut {
                    value: 10_000,
                    script_pubkey: Script::p2pkh(&[0x33; 20]),
                },
                TxOut {
                    value: 20_000,
                    script_pubkey: Script::p2pkh(&[0x44; 20]),
                },
            ],
        }
    }

    #[test]
    fn sighash_type_byte_roundtrip() {
        for byte in [0x01u8, 0x02, 0x03, 0x81, 0x82, 0x83] {
            let ty = SighashType::from_byte(byte).unwrap();
            assert_eq!(ty.to_byte(), byte);
        }
    }

    #[test]
    fn sighash_type_rejects_unknown_flags() {
        assert!(SighashType::from_byte(0x00).is_err());
        assert!(SighashType::from_byte(0x04).is_err());
        assert!(SighashType::from_byte(0x41).is_err());
    }

    #[test]
    fn legacy_sighash_deterministic() {
        let tx = two_in_two_out();
        let code = Script::p2pkh(&[0x33; 20]);
        let a = legacy_sighash(&tx, 0, &code, SighashType::ALL).unwrap();
        let b = legacy_sighash(&tx, 0, &code, SighashType::ALL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn legacy_sighash_differs_per_input() {
        let tx = two_in_two_out();
        let code = Script::p2pkh(&[0x33; 20]);
        let a = legacy_sighash(&tx, 0, &code, SighashType::ALL).unwrap();
        let b = legacy_sighash(&tx, 1, &code, SighashType::ALL).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn legacy_sighash_differs_per_type() {
        let tx = two_in_two_out();
        let code = Script::p2pkh(&[0x33; 20]);
        let all = legacy_sighash(&tx, 0, &code, SighashType::ALL).unwrap();
        let none = legacy_sighash(
            &tx,
            0,
            &code,
            SighashType {
                base: SighashBase::None,
                anyone_can_pay: false,
            },
        )
        .unwrap();
        assert_ne!(all, none);
    }

    #[test]
    fn legacy_sighash_index_out_of_bounds() {
        let tx = two_in_two_out();
        let code = Script::new();
        assert!(matches!(
            legacy_sighash(&tx, 5, &code, SighashType::ALL),
            Err(BtcError::IndexOutOfBounds { index: 5, len: 2 })
        ));
    }

    #[test]
    fn legacy_single_without_matching_output_rejected() {
        let mut tx = two_in_two_out();
        tx.outputs.truncate(1);
        let ty = SighashType {
            base: SighashBase::Single,
            anyone_can_pay: false,
        };
        assert!(legacy_sighash(&tx, 1, &Script::new(), ty).is_err());
    }

    #[test]
    fn bip143_p2wpkh_test_vector() {
        // BIP-143 "Native P2WPKH" example: the second input (index 1) of the
        // unsigned transaction, spending 6 BTC, signed SIGHASH_ALL.
        let raw = hex::decode(
            "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf43\
             3541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c\
             3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff022\
             02cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a\
             6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce\
             2f0167faa815988ac11000000",
        )
        .unwrap();
        let tx = Transaction::deserialize(&raw).unwrap();

        // scriptCode: P2PKH over the pubkey hash in the witness program.
        let script_code = Script::from_bytes(
            hex::decode("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").unwrap(),
        );
        let digest = segwit_sighash(&tx, 1, &script_code, 600_000_000, SighashType::ALL).unwrap();
        assert_eq!(
            hex::encode(digest),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
    }

    #[test]
    fn bip143_commits_to_amount() {
        let tx = two_in_two_out();
        let code = Script::p2pkh(&[0x55; 20]);
        let a = segwit_sighash(&tx, 0, &code, 10_000, SighashType::ALL).unwrap();
        let b = segwit_sighash(&tx, 0, &code, 10_001, SighashType::ALL).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn anyone_can_pay_ignores_other_inputs() {
        let ty = SighashType {
            base: SighashBase::All,
            anyone_can_pay: true,
        };
        let code = Script::p2pkh(&[0x55; 20]);

        let tx_a = two_in_two_out();
        let mut tx_b = two_in_two_out();
        tx_b.inputs[1].previous_output = OutPoint::new([0x77; 32], 9);

        let a = segwit_sighash(&tx_a, 0, &code, 10_000, ty).unwrap();
        let b = segwit_sighash(&tx_b, 0, &code, 10_000, ty).unwrap();
        assert_eq!(a, b);
    }
}
