//! Script construction and classification.
//!
//! A [`Script`] is an immutable byte sequence of opcodes and data pushes.
//! The engine works with a closed set of standard templates
//! ([`ScriptTemplate`]); builders validate their parameters and
//! [`Script::classify`] recognizes the templates exhaustively.

use crypto_utils::hashes::hash160;

use crate::error::BtcError;

// Opcodes used by the standard templates and the interpreter.
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4C;
pub const OP_PUSHDATA2: u8 = 0x4D;
pub const OP_PUSHDATA4: u8 = 0x4E;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6A;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RIPEMD160: u8 = 0xA6;
pub const OP_SHA256: u8 = 0xA8;
pub const OP_HASH160: u8 = 0xA9;
pub const OP_HASH256: u8 = 0xAA;
pub const OP_CHECKSIG: u8 = 0xAC;
pub const OP_CHECKSIGVERIFY: u8 = 0xAD;
pub const OP_CHECKMULTISIG: u8 = 0xAE;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xAF;

/// The closed set of script shapes the engine builds, signs, and finalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    /// Bare m-of-n CHECKMULTISIG.
    Multisig { required: u8, total: u8 },
    /// Anything that is not a recognized standard template.
    Raw,
}

/// A single parsed script element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOp {
    /// A data push (empty for OP_0).
    Push(Vec<u8>),
    /// A non-push opcode.
    Op(u8),
}

/// An immutable sequence of opcodes and data pushes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // ── Template builders ───────────────────────────────────────────────

    /// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Self {
        let mut b = ScriptBuilder::with_capacity(25);
        b.push_opcode(OP_DUP);
        b.push_opcode(OP_HASH160);
        b.push_slice(pubkey_hash);
        b.push_opcode(OP_EQUALVERIFY);
        b.push_opcode(OP_CHECKSIG);
        b.into_script()
    }

    /// `OP_HASH160 <20> OP_EQUAL`
    pub fn p2sh(script_hash: &[u8; 20]) -> Self {
        let mut b = ScriptBuilder::with_capacity(23);
        b.push_opcode(OP_HASH160);
        b.push_slice(script_hash);
        b.push_opcode(OP_EQUAL);
        b.into_script()
    }

    /// `OP_0 <20>`, the segwit v0 keyhash program.
    pub fn p2wpkh(pubkey_hash: &[u8; 20]) -> Self {
        let mut b = ScriptBuilder::with_capacity(22);
        b.push_opcode(OP_0);
        b.push_slice(pubkey_hash);
        b.into_script()
    }

    /// `OP_0 <32>`, the segwit v0 scripthash program.
    pub fn p2wsh(script_hash: &[u8; 32]) -> Self {
        let mut b = ScriptBuilder::with_capacity(34);
        b.push_opcode(OP_0);
        b.push_slice(script_hash);
        b.into_script()
    }

    /// `OP_m <pk>... OP_n OP_CHECKMULTISIG`
    ///
    /// Requires `1 <= required <= pubkeys.len() <= 16` and 33-byte
    /// compressed public keys; anything else is `InvalidThreshold` or
    /// `InvalidPublicKey`.
    pub fn multisig(required: usize, pubkeys: &[[u8; 33]]) -> Result<Self, BtcError> {
        let total = pubkeys.len();
        if required == 0 || total == 0 || required > total || total > 16 {
            return Err(BtcError::InvalidThreshold { required, total });
        }
        let mut b = ScriptBuilder::with_capacity(3 + total * 34);
        b.push_int(required as u8);
        for pk in pubkeys {
            b.push_slice(pk);
        }
        b.push_int(total as u8);
        b.push_opcode(OP_CHECKMULTISIG);
        Ok(b.into_script())
    }

    /// The P2SH wrapper for this script: `OP_HASH160 hash160(self) OP_EQUAL`.
    pub fn to_p2sh(&self) -> Script {
        Script::p2sh(&hash160(&self.0))
    }

    /// The P2WSH wrapper for this script: `OP_0 sha256(self)`.
    pub fn to_p2wsh(&self) -> Script {
        Script::p2wsh(&crypto_utils::hashes::sha256(&self.0))
    }

    // ── Classification ──────────────────────────────────────────────────

    /// Recognize the standard template this script matches, if any.
    pub fn classify(&self) -> ScriptTemplate {
        let b = &self.0;
        if b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
        {
            return ScriptTemplate::P2pkh;
        }
        if b.len() == 23 && b[0] == OP_HASH160 && b[1] == 20 && b[22] == OP_EQUAL {
            return ScriptTemplate::P2sh;
        }
        if b.len() == 22 && b[0] == OP_0 && b[1] == 20 {
            return ScriptTemplate::P2wpkh;
        }
        if b.len() == 34 && b[0] == OP_0 && b[1] == 32 {
            return ScriptTemplate::P2wsh;
        }
        if let Some((required, pubkeys)) = self.parse_multisig() {
            return ScriptTemplate::Multisig {
                required,
                total: pubkeys.len() as u8,
            };
        }
        ScriptTemplate::Raw
    }

    /// For P2PKH/P2WPKH scripts, the embedded 20-byte hash.
    pub fn pubkey_hash(&self) -> Option<[u8; 20]> {
        match self.classify() {
            ScriptTemplate::P2pkh => self.0[3..23].try_into().ok(),
            ScriptTemplate::P2wpkh => self.0[2..22].try_into().ok(),
            _ => None,
        }
    }

    /// For P2SH scripts, the embedded 20-byte script hash.
    pub fn script_hash(&self) -> Option<[u8; 20]> {
        match self.classify() {
            ScriptTemplate::P2sh => self.0[2..22].try_into().ok(),
            _ => None,
        }
    }

    /// For P2WSH scripts, the embedded 32-byte witness-script hash.
    pub fn witness_script_hash(&self) -> Option<[u8; 32]> {
        match self.classify() {
            ScriptTemplate::P2wsh => self.0[2..34].try_into().ok(),
            _ => None,
        }
    }

    /// Parse `OP_m <pk>... OP_n OP_CHECKMULTISIG`, returning the threshold
    /// and the pushed public keys in script order.
    pub fn parse_multisig(&self) -> Option<(u8, Vec<Vec<u8>>)> {
        let ops = self.parse_ops().ok()?;
        if ops.len() < 4 {
            return None;
        }
        let required = small_int(&ops[0])?;
        let total = small_int(&ops[ops.len() - 2])?;
        if ops[ops.len() - 1] != ScriptOp::Op(OP_CHECKMULTISIG) {
            return None;
        }
        let pubkeys: Vec<Vec<u8>> = ops[1..ops.len() - 2]
            .iter()
            .map(|op| match op {
                ScriptOp::Push(data) if data.len() == 33 || data.len() == 65 => {
                    Some(data.clone())
                }
                _ => None,
            })
            .collect::<Option<_>>()?;
        if required == 0 || pubkeys.len() != total as usize || required > total {
            return None;
        }
        Some((required, pubkeys))
    }

    /// Decode the script into pushes and opcodes. Fails on truncated pushes.
    pub fn parse_ops(&self) -> Result<Vec<ScriptOp>, BtcError> {
        let mut ops = Vec::new();
        let b = &self.0;
        let mut pos = 0;
        while pos < b.len() {
            let opcode = b[pos];
            pos += 1;
            let push_len = match opcode {
                OP_0 => {
                    ops.push(ScriptOp::Push(Vec::new()));
                    continue;
                }
                1..=0x4B => opcode as usize,
                OP_PUSHDATA1 => {
                    let n = *b.get(pos).ok_or_else(truncated)? as usize;
                    pos += 1;
                    n
                }
                OP_PUSHDATA2 => {
                    let bytes = b.get(pos..pos + 2).ok_or_else(truncated)?;
                    pos += 2;
                    u16::from_le_bytes([bytes[0], bytes[1]]) as usize
                }
                OP_PUSHDATA4 => {
                    let bytes = b.get(pos..pos + 4).ok_or_else(truncated)?;
                    pos += 4;
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                }
                op => {
                    ops.push(ScriptOp::Op(op));
                    continue;
                }
            };
            let data = b.get(pos..pos + push_len).ok_or_else(truncated)?;
            pos += push_len;
            ops.push(ScriptOp::Push(data.to_vec()));
        }
        Ok(ops)
    }
}

fn truncated() -> BtcError {
    BtcError::InvalidScript("truncated data push".into())
}

/// Interpret OP_0..OP_16 (or a single-byte push) as a small integer.
fn small_int(op: &ScriptOp) -> Option<u8> {
    match op {
        ScriptOp::Op(code) if (OP_1..=OP_16).contains(code) => Some(code - OP_1 + 1),
        ScriptOp::Push(data) if data.is_empty() => Some(0),
        ScriptOp::Push(data) if data.len() == 1 && data[0] <= 16 => Some(data[0]),
        _ => None,
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}

/// Incremental script writer with minimal push encoding.
pub struct ScriptBuilder(Vec<u8>);

impl ScriptBuilder {
    pub fn new() -> Self {
        ScriptBuilder(Vec::new())
    }

    pub fn with_capacity(cap: usize) -> Self {
        ScriptBuilder(Vec::with_capacity(cap))
    }

    pub fn push_opcode(&mut self, opcode: u8) -> &mut Self {
        self.0.push(opcode);
        self
    }

    /// Push `data` with the minimal encoding for its length. An empty slice
    /// becomes OP_0.
    pub fn push_slice(&mut self, data: &[u8]) -> &mut Self {
        match data.len() {
            0 => self.0.push(OP_0),
            n @ 1..=0x4B => {
                self.0.push(n as u8);
                self.0.extend_from_slice(data);
            }
            n @ 0x4C..=0xFF => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(n as u8);
                self.0.extend_from_slice(data);
            }
            n @ 0x100..=0xFFFF => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(n as u16).to_le_bytes());
                self.0.extend_from_slice(data);
            }
            n => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(n as u32).to_le_bytes());
                self.0.extend_from_slice(data);
            }
        }
        self
    }

    /// Push a small integer 0..=16 as OP_0..OP_16.
    pub fn push_int(&mut self, value: u8) -> &mut Self {
        debug_assert!(value <= 16);
        if value == 0 {
            self.0.push(OP_0);
        } else {
            self.0.push(OP_1 + value - 1);
        }
        self
    }

    pub fn into_script(self) -> Script {
        Script(self.0)
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
