//! Signing and finalizing partially signed transactions.
//!
//! [`sign_input`] computes the digest for one input, signs it with a raw
//! secp256k1 key, and records the signature in the input's partial-signature
//! map. [`finalize`] assembles final unlocking data for every input and
//! extracts the network-ready transaction. Signatures are deterministic
//! (RFC 6979) with low-S normalization, so signing is reproducible and
//! re-signing with the same key never grows the document.

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};

use crate::error::BtcError;
use crate::psbt::{Psbt, PsbtInput};
use crate::script::{Script, ScriptBuilder, ScriptTemplate};
use crate::sighash::{legacy_sighash, segwit_sighash};
use crate::transaction::Transaction;
use crypto_utils::hashes::hash160;

/// Sign one input of `psbt` with a raw private key.
///
/// The input must carry its spent output (`witness_utxo`); P2SH inputs need
/// their redeem script and P2WSH inputs their witness script. The resulting
/// signature is DER with the sighash flag byte appended, keyed by the
/// compressed public key.
pub fn sign_input(psbt: &mut Psbt, input_index: usize, key: &[u8; 32]) -> Result<(), BtcError> {
    if input_index >= psbt.inputs.len() {
        return Err(BtcError::IndexOutOfBounds {
            index: input_index,
            len: psbt.inputs.len(),
        });
    }

    let signing_key = SigningKey::from_bytes(key.into())
        .map_err(|_| BtcError::InvalidPrivateKey("key is zero or exceeds the curve order".into()))?;
    let pubkey: [u8; 33] = signing_key
        .verifying_key()
        .to_sec1_bytes()
        .as_ref()
        .try_into()
        .map_err(|_| BtcError::InvalidPublicKey("unexpected SEC1 length".into()))?;

    let input = &psbt.inputs[input_index];
    let utxo = input
        .witness_utxo
        .as_ref()
        .ok_or_else(|| BtcError::SigningFailed(format!("input {input_index} has no utxo")))?;
    let ty = input.sighash();

    let digest = match utxo.script_pubkey.classify() {
        ScriptTemplate::P2pkh => {
            legacy_sighash(&psbt.unsigned_tx, input_index, &utxo.script_pubkey, ty)?
        }
        ScriptTemplate::Multisig { .. } => {
            legacy_sighash(&psbt.unsigned_tx, input_index, &utxo.script_pubkey, ty)?
        }
        ScriptTemplate::P2wpkh => {
            let program = utxo
                .script_pubkey
                .pubkey_hash()
                .ok_or_else(|| BtcError::InvalidScript("malformed witness program".into()))?;
            let script_code = Script::p2pkh(&program);
            segwit_sighash(&psbt.unsigned_tx, input_index, &script_code, utxo.value, ty)?
        }
        ScriptTemplate::P2wsh => {
            let witness_script = input.witness_script.as_ref().ok_or_else(|| {
                BtcError::SigningFailed(format!("input {input_index} has no witness script"))
            })?;
            segwit_sighash(&psbt.unsigned_tx, input_index, witness_script, utxo.value, ty)?
        }
        ScriptTemplate::P2sh => {
            let redeem = input.redeem_script.as_ref().ok_or_else(|| {
                BtcError::SigningFailed(format!("input {input_index} has no redeem script"))
            })?;
            match redeem.classify() {
                // Nested segwit: sign with the BIP-143 digest.
                ScriptTemplate::P2wpkh => {
                    let program = redeem
                        .pubkey_hash()
                        .ok_or_else(|| BtcError::InvalidScript("malformed redeem script".into()))?;
                    let script_code = Script::p2pkh(&program);
                    segwit_sighash(&psbt.unsigned_tx, input_index, &script_code, utxo.value, ty)?
                }
                ScriptTemplate::P2wsh => {
                    let witness_script = input.witness_script.as_ref().ok_or_else(|| {
                        BtcError::SigningFailed(format!(
                            "input {input_index} has no witness script"
                        ))
                    })?;
                    segwit_sighash(&psbt.unsigned_tx, input_index, witness_script, utxo.value, ty)?
                }
                _ => legacy_sighash(&psbt.unsigned_tx, input_index, redeem, ty)?,
            }
        }
        ScriptTemplate::Raw => {
            return Err(BtcError::SigningFailed(format!(
                "input {input_index} spends a non-standard script"
            )))
        }
    };

    let signature: Signature = signing_key
        .sign_prehash(&digest)
        .map_err(|e| BtcError::SigningFailed(e.to_string()))?;
    let mut sig_bytes = signature.to_der().as_bytes().to_vec();
    sig_bytes.push(ty.to_byte());

    psbt.inputs[input_index].partial_sigs.insert(pubkey, sig_bytes);
    Ok(())
}

/// Assemble final unlocking data for every input and extract the
/// broadcast-ready transaction.
///
/// Inputs that already carry final data are used as-is. Multisig inputs
/// below their threshold fail with `InsufficientSignatures`; the error
/// reports the first deficient input.
pub fn finalize(psbt: &Psbt) -> Result<Transaction, BtcError> {
    let mut tx = psbt.unsigned_tx.clone();
    for (index, input) in psbt.inputs.iter().enumerate() {
        let (script_sig, witness) = assemble_input(input, index)?;
        tx.inputs[index].script_sig = script_sig;
        tx.inputs[index].witness = witness;
    }
    Ok(tx)
}

/// Number of signatures an input needs before it can be finalized.
pub fn signature_threshold(input: &PsbtInput) -> Result<usize, BtcError> {
    let utxo = input
        .witness_utxo
        .as_ref()
        .ok_or_else(|| BtcError::SigningFailed("input has no utxo".into()))?;
    let spend_script = match utxo.script_pubkey.classify() {
        ScriptTemplate::P2sh => input.redeem_script.clone(),
        ScriptTemplate::P2wsh => input.witness_script.clone(),
        _ => None,
    };
    let script = spend_script.as_ref().unwrap_or(&utxo.script_pubkey);
    match script.classify() {
        ScriptTemplate::Multisig { required, .. } => Ok(required as usize),
        ScriptTemplate::P2wsh => match input.witness_script.as_ref().map(|s| s.classify()) {
            Some(ScriptTemplate::Multisig { required, .. }) => Ok(required as usize),
            _ => Ok(1),
        },
        _ => Ok(1),
    }
}

fn assemble_input(input: &PsbtInput, index: usize) -> Result<(Script, Vec<Vec<u8>>), BtcError> {
    if input.is_final() {
        return Ok((
            input.final_script_sig.clone().unwrap_or_default(),
            input.final_script_witness.clone().unwrap_or_default(),
        ));
    }

    let utxo = input
        .witness_utxo
        .as_ref()
        .ok_or_else(|| BtcError::SigningFailed(format!("input {index} has no utxo")))?;

    match utxo.script_pubkey.classify() {
        ScriptTemplate::P2pkh => {
            let program = utxo
                .script_pubkey
                .pubkey_hash()
                .ok_or_else(|| BtcError::InvalidScript("malformed keyhash script".into()))?;
            let (pubkey, sig) = keyhash_signature(input, index, &program)?;
            let mut b = ScriptBuilder::new();
            b.push_slice(&sig);
            b.push_slice(&pubkey);
            Ok((b.into_script(), Vec::new()))
        }
        ScriptTemplate::P2wpkh => {
            let program = utxo
                .script_pubkey
                .pubkey_hash()
                .ok_or_else(|| BtcError::InvalidScript("malformed witness program".into()))?;
            let (pubkey, sig) = keyhash_signature(input, index, &program)?;
            Ok((Script::new(), vec![sig, pubkey.to_vec()]))
        }
        ScriptTemplate::Multisig { required, .. } => {
            let sigs = multisig_signatures(input, index, &utxo.script_pubkey, required)?;
            let mut b = ScriptBuilder::new();
            b.push_slice(&[]); // CHECKMULTISIG dummy
            for sig in &sigs {
                b.push_slice(sig);
            }
            Ok((b.into_script(), Vec::new()))
        }
        ScriptTemplate::P2wsh => {
            let witness_script = input.witness_script.as_ref().ok_or_else(|| {
                BtcError::SigningFailed(format!("input {index} has no witness script"))
            })?;
            let witness = witness_script_stack(input, index, witness_script)?;
            Ok((Script::new(), witness))
        }
        ScriptTemplate::P2sh => {
            let redeem = input.redeem_script.as_ref().ok_or_else(|| {
                BtcError::SigningFailed(format!("input {index} has no redeem script"))
            })?;
            match redeem.classify() {
                ScriptTemplate::P2wpkh => {
                    let program = redeem
                        .pubkey_hash()
                        .ok_or_else(|| BtcError::InvalidScript("malformed redeem script".into()))?;
                    let (pubkey, sig) = keyhash_signature(input, index, &program)?;
                    let mut b = ScriptBuilder::new();
                    b.push_slice(redeem.as_bytes());
                    Ok((b.into_script(), vec![sig, pubkey.to_vec()]))
                }
                ScriptTemplate::P2wsh => {
                    let witness_script = input.witness_script.as_ref().ok_or_else(|| {
                        BtcError::SigningFailed(format!("input {index} has no witness script"))
                    })?;
                    let witness = witness_script_stack(input, index, witness_script)?;
                    let mut b = ScriptBuilder::new();
                    b.push_slice(redeem.as_bytes());
                    Ok((b.into_script(), witness))
                }
                ScriptTemplate::Multisig { required, .. } => {
                    let sigs = multisig_signatures(input, index, redeem, required)?;
                    let mut b = ScriptBuilder::new();
                    b.push_slice(&[]);
                    for sig in &sigs {
                        b.push_slice(sig);
                    }
                    b.push_slice(redeem.as_bytes());
                    Ok((b.into_script(), Vec::new()))
                }
                _ => Err(BtcError::SigningFailed(format!(
                    "input {index} has a non-standard redeem script"
                ))),
            }
        }
        ScriptTemplate::Raw => Err(BtcError::SigningFailed(format!(
            "input {index} spends a non-standard script"
        ))),
    }
}

/// The signature for a keyhash input, selected by matching the pubkey's
/// HASH160 against the spent program. Stray signatures from other keys
/// are ignored rather than assembled into an unspendable script.
fn keyhash_signature(
    input: &PsbtInput,
    index: usize,
    program: &[u8; 20],
) -> Result<([u8; 33], Vec<u8>), BtcError> {
    input
        .partial_sigs
        .iter()
        .find(|(pubkey, _)| hash160(&pubkey[..]) == *program)
        .map(|(pubkey, sig)| (*pubkey, sig.clone()))
        .ok_or(BtcError::InsufficientSignatures {
            input: index,
            have: 0,
            need: 1,
        })
}

/// Signatures for a multisig script, ordered by key position in the script.
fn multisig_signatures(
    input: &PsbtInput,
    index: usize,
    script: &Script,
    required: u8,
) -> Result<Vec<Vec<u8>>, BtcError> {
    let (_, pubkeys) = script
        .parse_multisig()
        .ok_or_else(|| BtcError::InvalidScript("not a multisig script".into()))?;
    let sigs: Vec<Vec<u8>> = pubkeys
        .iter()
        .filter_map(|pk| {
            let pk: &[u8; 33] = pk.as_slice().try_into().ok()?;
            input.partial_sigs.get(pk).cloned()
        })
        .take(required as usize)
        .collect();
    if sigs.len() < required as usize {
        return Err(BtcError::InsufficientSignatures {
            input: index,
            have: sigs.len(),
            need: required as usize,
        });
    }
    Ok(sigs)
}

fn witness_script_stack(
    input: &PsbtInput,
    index: usize,
    witness_script: &Script,
) -> Result<Vec<Vec<u8>>, BtcError> {
    match witness_script.classify() {
        ScriptTemplate::Multisig { required, .. } => {
            let sigs = multisig_signatures(input, index, witness_script, required)?;
            let mut witness = Vec::with_capacity(sigs.len() + 2);
            witness.push(Vec::new()); // CHECKMULTISIG dummy
            witness.extend(sigs);
            witness.push(witness_script.to_bytes());
            Ok(witness)
        }
        _ => Err(BtcError::SigningFailed(format!(
            "input {index} has a non-standard witness script"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{verify_spend, TransactionChecker};
    use crate::psbt::Psbt;
    use crate::transaction::{OutPoint, TransactionBuilder, TxOut};

    fn raw_key(seed: u8) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[31] = seed;
        key
    }

    fn pubkey_of(key: &[u8; 32]) -> [u8; 33] {
        SigningKey::from_bytes(key.into())
            .unwrap()
            .verifying_key()
            .to_sec1_bytes()
            .as_ref()
            .try_into()
            .unwrap()
    }

    fn psbt_spending(script_pubkey: Script, amount: u64) -> Psbt {
        let mut b = TransactionBuilder::new();
        b.add_input(OutPoint::new([0xAB; 32], 0));
        b.add_output(amount as i64 - 1_000, Script::p2wpkh(&[0x99; 20]))
            .unwrap();
        let tx = b.finalize().unwrap();
        let mut psbt = Psbt::from_unsigned_tx(tx).unwrap();
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: amount,
            script_pubkey,
        });
        psbt
    }

    fn check_against_utxo(psbt: &Psbt, tx: &Transaction, segwit: bool) -> bool {
        let utxo = psbt.inputs[0].witness_utxo.as_ref().unwrap();
        let checker = TransactionChecker {
            tx,
            input_index: 0,
            amount: utxo.value,
            segwit,
        };
        verify_spend(
            &utxo.script_pubkey,
            &tx.inputs[0].script_sig,
            &tx.inputs[0].witness,
            &checker,
        )
    }

    #[test]
    fn sign_and_finalize_p2wpkh() {
        let key = raw_key(7);
        let pubkey = pubkey_of(&key);
        let mut psbt = psbt_spending(Script::p2wpkh(&hash160(&pubkey)), 100_000);

        sign_input(&mut psbt, 0, &key).unwrap();
        assert_eq!(psbt.inputs[0].partial_sigs.len(), 1);

        let tx = finalize(&psbt).unwrap();
        assert_eq!(tx.inputs[0].witness.len(), 2);
        assert!(tx.inputs[0].script_sig.is_empty());
        assert!(check_against_utxo(&psbt, &tx, true));
    }

    #[test]
    fn sign_and_finalize_p2pkh() {
        let key = raw_key(8);
        let pubkey = pubkey_of(&key);
        let mut psbt = psbt_spending(Script::p2pkh(&hash160(&pubkey)), 80_000);

        sign_input(&mut psbt, 0, &key).unwrap();
        let tx = finalize(&psbt).unwrap();
        assert!(tx.inputs[0].witness.is_empty());
        assert!(check_against_utxo(&psbt, &tx, false));
    }

    #[test]
    fn signing_is_idempotent() {
        let key = raw_key(9);
        let pubkey = pubkey_of(&key);
        let mut psbt = psbt_spending(Script::p2wpkh(&hash160(&pubkey)), 50_000);

        sign_input(&mut psbt, 0, &key).unwrap();
        let first = psbt.inputs[0].partial_sigs.clone();
        sign_input(&mut psbt, 0, &key).unwrap();
        assert_eq!(psbt.inputs[0].partial_sigs, first);
    }

    #[test]
    fn p2sh_multisig_two_of_three() {
        let keys: Vec<[u8; 32]> = (1u8..=3).map(raw_key).collect();
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(pubkey_of).collect();
        let redeem = Script::multisig(2, &pubkeys).unwrap();
        let mut psbt = psbt_spending(redeem.to_p2sh(), 200_000);
        psbt.inputs[0].redeem_script = Some(redeem);

        sign_input(&mut psbt, 0, &keys[0]).unwrap();
        // One signature short of the threshold.
        match finalize(&psbt).unwrap_err() {
            BtcError::InsufficientSignatures {
                input: 0,
                have: 1,
                need: 2,
            } => {}
            other => panic!("expected InsufficientSignatures, got {other:?}"),
        }

        sign_input(&mut psbt, 0, &keys[2]).unwrap();
        let tx = finalize(&psbt).unwrap();
        assert!(check_against_utxo(&psbt, &tx, false));
    }

    #[test]
    fn p2wsh_multisig_two_of_two() {
        let keys: Vec<[u8; 32]> = (4u8..=5).map(raw_key).collect();
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(pubkey_of).collect();
        let witness_script = Script::multisig(2, &pubkeys).unwrap();
        let mut psbt = psbt_spending(witness_script.to_p2wsh(), 300_000);
        psbt.inputs[0].witness_script = Some(witness_script.clone());

        for key in &keys {
            sign_input(&mut psbt, 0, key).unwrap();
        }
        let tx = finalize(&psbt).unwrap();
        // Stack: dummy, two signatures, witness script.
        assert_eq!(tx.inputs[0].witness.len(), 4);
        assert_eq!(tx.inputs[0].witness[3], witness_script.to_bytes());
        assert!(check_against_utxo(&psbt, &tx, true));
    }

    #[test]
    fn nested_p2wpkh_in_p2sh() {
        let key = raw_key(6);
        let pubkey = pubkey_of(&key);
        let redeem = Script::p2wpkh(&hash160(&pubkey));
        let mut psbt = psbt_spending(redeem.to_p2sh(), 150_000);
        psbt.inputs[0].redeem_script = Some(redeem.clone());

        sign_input(&mut psbt, 0, &key).unwrap();
        let tx = finalize(&psbt).unwrap();
        // scriptSig pushes the redeem script; the witness holds sig and key.
        assert_eq!(tx.inputs[0].witness.len(), 2);
        assert!(!tx.inputs[0].script_sig.is_empty());
        assert!(check_against_utxo(&psbt, &tx, true));
    }

    #[test]
    fn missing_utxo_rejected() {
        let mut b = TransactionBuilder::new();
        b.add_input(OutPoint::new([0x01; 32], 0));
        b.add_output(1_000, Script::p2wpkh(&[0x11; 20])).unwrap();
        let mut psbt = Psbt::from_unsigned_tx(b.finalize().unwrap()).unwrap();
        assert!(matches!(
            sign_input(&mut psbt, 0, &raw_key(1)),
            Err(BtcError::SigningFailed(_))
        ));
    }

    #[test]
    fn missing_redeem_script_rejected() {
        let key = raw_key(2);
        let pubkey = pubkey_of(&key);
        let redeem = Script::p2wpkh(&hash160(&pubkey));
        let mut psbt = psbt_spending(redeem.to_p2sh(), 10_000);
        assert!(matches!(
            sign_input(&mut psbt, 0, &key),
            Err(BtcError::SigningFailed(_))
        ));
    }

    #[test]
    fn zero_key_rejected() {
        let pubkey = pubkey_of(&raw_key(1));
        let mut psbt = psbt_spending(Script::p2wpkh(&hash160(&pubkey)), 10_000);
        assert!(matches!(
            sign_input(&mut psbt, 0, &[0u8; 32]),
            Err(BtcError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn input_index_out_of_bounds() {
        let pubkey = pubkey_of(&raw_key(1));
        let mut psbt = psbt_spending(Script::p2wpkh(&hash160(&pubkey)), 10_000);
        assert!(matches!(
            sign_input(&mut psbt, 5, &raw_key(1)),
            Err(BtcError::IndexOutOfBounds { index: 5, len: 1 })
        ));
    }

    #[test]
    fn raw_script_pubkey_rejected() {
        let mut psbt = psbt_spending(Script::from_bytes(vec![0x6A]), 10_000);
        assert!(matches!(
            sign_input(&mut psbt, 0, &raw_key(1)),
            Err(BtcError::SigningFailed(_))
        ));
        assert!(finalize(&psbt).is_err());
    }

    #[test]
    fn threshold_reporting() {
        let keys: Vec<[u8; 32]> = (1u8..=3).map(raw_key).collect();
        let pubkeys: Vec<[u8; 33]> = keys.iter().map(pubkey_of).collect();
        let redeem = Script::multisig(2, &pubkeys).unwrap();
        let mut psbt = psbt_spending(redeem.to_p2sh(), 10_000);
        psbt.inputs[0].redeem_script = Some(redeem);
        assert_eq!(signature_threshold(&psbt.inputs[0]).unwrap(), 2);

        let single = psbt_spending(Script::p2wpkh(&[0x22; 20]), 10_000);
        assert_eq!(signature_threshold(&single.inputs[0]).unwrap(), 1);
    }

    #[test]
    fn stray_signature_does_not_finalize_keyhash_input() {
        let key = raw_key(10);
        let stranger = raw_key(11);
        let pubkey = pubkey_of(&key);
        let mut psbt = psbt_spending(Script::p2wpkh(&hash160(&pubkey)), 40_000);

        // A signature from a key that does not hash to the spent program.
        psbt.inputs[0]
            .partial_sigs
            .insert(pubkey_of(&stranger), vec![0x30, 0x44, 0x01]);
        assert!(matches!(
            finalize(&psbt),
            Err(BtcError::InsufficientSignatures {
                input: 0,
                have: 0,
                need: 1,
            })
        ));

        // With the matching signature present the stray one is ignored.
        sign_input(&mut psbt, 0, &key).unwrap();
        let tx = finalize(&psbt).unwrap();
        assert_eq!(tx.inputs[0].witness[1], pubkey.to_vec());
        assert!(check_against_utxo(&psbt, &tx, true));
    }

    #[test]
    fn preexisting_final_data_is_kept() {
        let pubkey = pubkey_of(&raw_key(1));
        let mut psbt = psbt_spending(Script::p2wpkh(&hash160(&pubkey)), 10_000);
        psbt.inputs[0].final_script_witness = Some(vec![vec![0x01], vec![0x02]]);
        let tx = finalize(&psbt).unwrap();
        assert_eq!(tx.inputs[0].witness, vec![vec![0x01], vec![0x02]]);
    }
}
