//! Minimal script execution for the standard templates.
//!
//! [`verify_spend`] checks unlocking data (scriptSig plus witness) against a
//! locking script, with P2SH and segwit v0 program unwrapping. The engine
//! covers the opcodes the standard templates use; anything outside that set
//! fails the spend. Evaluation never panics: every malformed script or stack
//! underflow is an internal error that surfaces as `false`.

use crypto_utils::hashes::{hash160, sha256, sha256d};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use ripemd::{Digest, Ripemd160};

use crate::script::{
    Script, ScriptOp, ScriptTemplate, OP_0, OP_1, OP_16, OP_CHECKMULTISIG,
    OP_CHECKMULTISIGVERIFY, OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_DROP, OP_DUP, OP_EQUAL,
    OP_EQUALVERIFY, OP_HASH160, OP_HASH256, OP_NOP, OP_RIPEMD160, OP_SHA256, OP_VERIFY,
};
use crate::sighash::{legacy_sighash, segwit_sighash, SighashType};
use crate::transaction::Transaction;

/// Validates a signature against the digest of the transaction being
/// verified. The interpreter pulls the signature and key off the stack and
/// hands them here together with the script code in effect.
pub trait SignatureChecker {
    /// `sig_with_type` is a DER signature with the sighash flag byte
    /// appended, as scripts carry it.
    fn check_ecdsa(&self, sig_with_type: &[u8], pubkey: &[u8], script_code: &Script) -> bool;
}

/// Checks signatures against a concrete transaction input.
pub struct TransactionChecker<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    /// Value of the spent output; only consulted for segwit digests.
    pub amount: u64,
    /// Selects the BIP-143 digest instead of the legacy one.
    pub segwit: bool,
}

impl SignatureChecker for TransactionChecker<'_> {
    fn check_ecdsa(&self, sig_with_type: &[u8], pubkey: &[u8], script_code: &Script) -> bool {
        let Some((&type_byte, der)) = sig_with_type.split_last() else {
            return false;
        };
        let Ok(ty) = SighashType::from_byte(type_byte) else {
            return false;
        };
        let digest = if self.segwit {
            segwit_sighash(self.tx, self.input_index, script_code, self.amount, ty)
        } else {
            legacy_sighash(self.tx, self.input_index, script_code, ty)
        };
        let Ok(digest) = digest else {
            return false;
        };
        let Ok(sig) = Signature::from_der(der) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_sec1_bytes(pubkey) else {
            return false;
        };
        key.verify_prehash(&digest, &sig).is_ok()
    }
}

/// Rejects every signature. Used to probe script structure without a
/// transaction context.
pub struct NullChecker;

impl SignatureChecker for NullChecker {
    fn check_ecdsa(&self, _sig: &[u8], _pubkey: &[u8], _script_code: &Script) -> bool {
        false
    }
}

/// Verify that `script_sig` and `witness` satisfy `script_pubkey`.
///
/// Returns `false` for any failure, including malformed scripts.
pub fn verify_spend(
    script_pubkey: &Script,
    script_sig: &Script,
    witness: &[Vec<u8>],
    checker: &dyn SignatureChecker,
) -> bool {
    eval_spend(script_pubkey, script_sig, witness, checker).is_ok()
}

/// Internal evaluation failure. Collapsed to `false` at the public boundary.
#[derive(Debug)]
enum EvalError {
    StackUnderflow,
    VerifyFailed,
    UnsupportedOpcode(u8),
    MalformedScript,
    WrongWitness,
}

type Stack = Vec<Vec<u8>>;

fn eval_spend(
    script_pubkey: &Script,
    script_sig: &Script,
    witness: &[Vec<u8>],
    checker: &dyn SignatureChecker,
) -> Result<(), EvalError> {
    match script_pubkey.classify() {
        ScriptTemplate::P2wpkh => {
            if !script_sig.is_empty() {
                return Err(EvalError::WrongWitness);
            }
            let program = script_pubkey
                .pubkey_hash()
                .ok_or(EvalError::MalformedScript)?;
            verify_p2wpkh(&program, witness, checker)
        }
        ScriptTemplate::P2wsh => {
            if !script_sig.is_empty() {
                return Err(EvalError::WrongWitness);
            }
            let program = script_pubkey
                .witness_script_hash()
                .ok_or(EvalError::MalformedScript)?;
            verify_p2wsh(&program, witness, checker)
        }
        ScriptTemplate::P2sh => {
            let mut stack = push_only_stack(script_sig)?;
            let redeem_bytes = stack.pop().ok_or(EvalError::StackUnderflow)?;
            let expected = script_pubkey
                .script_hash()
                .ok_or(EvalError::MalformedScript)?;
            if hash160(&redeem_bytes) != expected {
                return Err(EvalError::VerifyFailed);
            }
            let redeem = Script::from_bytes(redeem_bytes);
            // Nested segwit: the redeem script is itself a witness program
            // and the remaining scriptSig must be empty.
            match redeem.classify() {
                ScriptTemplate::P2wpkh if stack.is_empty() => {
                    let program = redeem.pubkey_hash().ok_or(EvalError::MalformedScript)?;
                    verify_p2wpkh(&program, witness, checker)
                }
                ScriptTemplate::P2wsh if stack.is_empty() => {
                    let program = redeem
                        .witness_script_hash()
                        .ok_or(EvalError::MalformedScript)?;
                    verify_p2wsh(&program, witness, checker)
                }
                _ => {
                    if !witness.is_empty() {
                        return Err(EvalError::WrongWitness);
                    }
                    run_script(&redeem, &mut stack, checker, &redeem)?;
                    finish(stack)
                }
            }
        }
        _ => {
            if !witness.is_empty() {
                return Err(EvalError::WrongWitness);
            }
            let mut stack = push_only_stack(script_sig)?;
            run_script(script_pubkey, &mut stack, checker, script_pubkey)?;
            finish(stack)
        }
    }
}

fn verify_p2wpkh(
    program: &[u8; 20],
    witness: &[Vec<u8>],
    checker: &dyn SignatureChecker,
) -> Result<(), EvalError> {
    let [sig, pubkey] = witness else {
        return Err(EvalError::WrongWitness);
    };
    if hash160(pubkey) != *program {
        return Err(EvalError::VerifyFailed);
    }
    // BIP-143 evaluates a P2WPKH spend as an implicit P2PKH script.
    let script_code = Script::p2pkh(program);
    if checker.check_ecdsa(sig, pubkey, &script_code) {
        Ok(())
    } else {
        Err(EvalError::VerifyFailed)
    }
}

fn verify_p2wsh(
    program: &[u8; 32],
    witness: &[Vec<u8>],
    checker: &dyn SignatureChecker,
) -> Result<(), EvalError> {
    let (script_bytes, stack_items) = witness.split_last().ok_or(EvalError::WrongWitness)?;
    if sha256(script_bytes) != *program {
        return Err(EvalError::VerifyFailed);
    }
    let witness_script = Script::from_bytes(script_bytes.clone());
    let mut stack: Stack = stack_items.to_vec();
    run_script(&witness_script, &mut stack, checker, &witness_script)?;
    finish(stack)
}

/// Execute a scriptSig that must consist only of data pushes.
fn push_only_stack(script_sig: &Script) -> Result<Stack, EvalError> {
    let ops = script_sig.parse_ops().map_err(|_| EvalError::MalformedScript)?;
    let mut stack = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            ScriptOp::Push(data) => stack.push(data),
            ScriptOp::Op(code) if (OP_1..=OP_16).contains(&code) => {
                stack.push(vec![code - OP_1 + 1]);
            }
            ScriptOp::Op(_) => return Err(EvalError::MalformedScript),
        }
    }
    Ok(stack)
}

fn run_script(
    script: &Script,
    stack: &mut Stack,
    checker: &dyn SignatureChecker,
    script_code: &Script,
) -> Result<(), EvalError> {
    let ops = script.parse_ops().map_err(|_| EvalError::MalformedScript)?;
    for op in ops {
        match op {
            ScriptOp::Push(data) => stack.push(data),
            ScriptOp::Op(code) => {
                exec_opcode(code, stack, checker, script_code)?;
            }
        }
    }
    Ok(())
}

fn exec_opcode(
    code: u8,
    stack: &mut Stack,
    checker: &dyn SignatureChecker,
    script_code: &Script,
) -> Result<(), EvalError> {
    match code {
        OP_0 => stack.push(Vec::new()),
        OP_1..=OP_16 => stack.push(vec![code - OP_1 + 1]),
        OP_NOP => {}
        OP_DUP => {
            let top = stack.last().ok_or(EvalError::StackUnderflow)?.clone();
            stack.push(top);
        }
        OP_DROP => {
            stack.pop().ok_or(EvalError::StackUnderflow)?;
        }
        OP_VERIFY => {
            let top = stack.pop().ok_or(EvalError::StackUnderflow)?;
            if !truthy(&top) {
                return Err(EvalError::VerifyFailed);
            }
        }
        OP_EQUAL | OP_EQUALVERIFY => {
            let a = stack.pop().ok_or(EvalError::StackUnderflow)?;
            let b = stack.pop().ok_or(EvalError::StackUnderflow)?;
            let equal = a == b;
            if code == OP_EQUALVERIFY {
                if !equal {
                    return Err(EvalError::VerifyFailed);
                }
            } else {
                stack.push(bool_item(equal));
            }
        }
        OP_RIPEMD160 => {
            let top = stack.pop().ok_or(EvalError::StackUnderflow)?;
            stack.push(Ripemd160::digest(&top).to_vec());
        }
        OP_SHA256 => {
            let top = stack.pop().ok_or(EvalError::StackUnderflow)?;
            stack.push(sha256(&top).to_vec());
        }
        OP_HASH160 => {
            let top = stack.pop().ok_or(EvalError::StackUnderflow)?;
            stack.push(hash160(&top).to_vec());
        }
        OP_HASH256 => {
            let top = stack.pop().ok_or(EvalError::StackUnderflow)?;
            stack.push(sha256d(&top).to_vec());
        }
        OP_CHECKSIG | OP_CHECKSIGVERIFY => {
            let pubkey = stack.pop().ok_or(EvalError::StackUnderflow)?;
            let sig = stack.pop().ok_or(EvalError::StackUnderflow)?;
            let ok = checker.check_ecdsa(&sig, &pubkey, script_code);
            if code == OP_CHECKSIGVERIFY {
                if !ok {
                    return Err(EvalError::VerifyFailed);
                }
            } else {
                stack.push(bool_item(ok));
            }
        }
        OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
            let ok = exec_checkmultisig(stack, checker, script_code)?;
            if code == OP_CHECKMULTISIGVERIFY {
                if !ok {
                    return Err(EvalError::VerifyFailed);
                }
            } else {
                stack.push(bool_item(ok));
            }
        }
        other => return Err(EvalError::UnsupportedOpcode(other)),
    }
    Ok(())
}

/// Pop `n pk_n..pk_1 m sig_m..sig_1 dummy` and verify signatures in order
/// against the keys in order; each key is consumed at most once.
fn exec_checkmultisig(
    stack: &mut Stack,
    checker: &dyn SignatureChecker,
    script_code: &Script,
) -> Result<bool, EvalError> {
    let key_count = pop_count(stack, 20)?;
    let pubkeys = pop_n(stack, key_count)?;

    let sig_count = pop_count(stack, key_count)?;
    let sigs = pop_n(stack, sig_count)?;

    // Historical off-by-one: one extra element is consumed.
    stack.pop().ok_or(EvalError::StackUnderflow)?;

    // Match from the top of both lists; each key is consumed at most once,
    // so signatures must appear in the same relative order as their keys.
    let mut ikey = key_count as isize - 1;
    let mut isig = sig_count as isize - 1;
    while isig >= 0 {
        if ikey < isig {
            return Ok(false);
        }
        if checker.check_ecdsa(&sigs[isig as usize], &pubkeys[ikey as usize], script_code) {
            isig -= 1;
        }
        ikey -= 1;
    }
    Ok(true)
}

fn pop_count(stack: &mut Stack, max: usize) -> Result<usize, EvalError> {
    let item = stack.pop().ok_or(EvalError::StackUnderflow)?;
    let count = match item.len() {
        0 => 0,
        1 => item[0] as usize,
        _ => return Err(EvalError::MalformedScript),
    };
    if count > max {
        return Err(EvalError::MalformedScript);
    }
    Ok(count)
}

fn pop_n(stack: &mut Stack, n: usize) -> Result<Vec<Vec<u8>>, EvalError> {
    if stack.len() < n {
        return Err(EvalError::StackUnderflow);
    }
    Ok(stack.split_off(stack.len() - n))
}

fn finish(mut stack: Stack) -> Result<(), EvalError> {
    let top = stack.pop().ok_or(EvalError::StackUnderflow)?;
    if truthy(&top) {
        Ok(())
    } else {
        Err(EvalError::VerifyFailed)
    }
}

/// Script truth: any nonzero byte, ignoring a negative-zero sign byte.
fn truthy(item: &[u8]) -> bool {
    match item.split_last() {
        None => false,
        Some((&last, rest)) => last != 0x00 && last != 0x80 || rest.iter().any(|&b| b != 0),
    }
}

fn bool_item(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}
