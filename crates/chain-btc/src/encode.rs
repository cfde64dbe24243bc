//! Consensus wire-format primitives: CompactSize variable-length integers
//! and a bounds-checked byte reader shared by the transaction and PSBT
//! codecs.

use crate::error::BtcError;

/// Append a CompactSize (Bitcoin variable-length integer) to `buf`.
pub fn write_compact_size(buf: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        buf.push(value as u8);
    } else if value <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFFFF_FFFF {
        buf.push(0xFE);
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

/// Append a CompactSize length prefix followed by the bytes themselves.
pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// A cursor over a byte slice with bounds-checked reads.
///
/// Every read fails with `InvalidTransaction` on truncated input instead of
/// panicking, so malformed wire data is always surfaced as an error.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BtcError> {
        if self.remaining() < len {
            return Err(BtcError::InvalidTransaction(format!(
                "unexpected end of data: wanted {len} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, BtcError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, BtcError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, BtcError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, BtcError> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BtcError> {
        let b = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Read a CompactSize integer, rejecting non-minimal encodings.
    pub fn read_compact_size(&mut self) -> Result<u64, BtcError> {
        let tag = self.read_u8()?;
        let value = match tag {
            0xFD => {
                let v = self.read_u16_le()? as u64;
                if v < 0xFD {
                    return Err(non_minimal(v));
                }
                v
            }
            0xFE => {
                let v = self.read_u32_le()? as u64;
                if v <= 0xFFFF {
                    return Err(non_minimal(v));
                }
                v
            }
            0xFF => {
                let v = self.read_u64_le()?;
                if v <= 0xFFFF_FFFF {
                    return Err(non_minimal(v));
                }
                v
            }
            n => n as u64,
        };
        Ok(value)
    }

    /// Read a CompactSize-prefixed byte string.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, BtcError> {
        let len = self.read_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(BtcError::InvalidTransaction(format!(
                "declared length {len} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(self.read_bytes(len as usize)?.to_vec())
    }
}

fn non_minimal(value: u64) -> BtcError {
    BtcError::InvalidTransaction(format!("non-minimal CompactSize encoding of {value}"))
}
