//! BIP-32 derivation paths: child indices and their textual form.

use std::fmt;
use std::str::FromStr;

use crate::error::WalletError;

const HARDENED_OFFSET: u32 = 1 << 31;

/// A single derivation step: a non-hardened or hardened child index.
///
/// Both variants carry an offset index in `[0, 2^31)`; the hardened bit
/// lives in the variant, not the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildNumber {
    Normal { index: u32 },
    Hardened { index: u32 },
}

impl ChildNumber {
    /// A non-hardened step. `index` must be below 2^31.
    pub fn normal(index: u32) -> Result<Self, WalletError> {
        if index >= HARDENED_OFFSET {
            return Err(WalletError::IndexOutOfRange { index });
        }
        Ok(ChildNumber::Normal { index })
    }

    /// A hardened step. `index` is the offset form, so it must also be
    /// below 2^31; `hardened(0)` is the step written `0'`.
    pub fn hardened(index: u32) -> Result<Self, WalletError> {
        if index >= HARDENED_OFFSET {
            return Err(WalletError::IndexOutOfRange { index });
        }
        Ok(ChildNumber::Hardened { index })
    }

    /// Interpret a raw wire index: values at or above 2^31 are hardened.
    pub fn from_raw(raw: u32) -> Self {
        if raw >= HARDENED_OFFSET {
            ChildNumber::Hardened {
                index: raw - HARDENED_OFFSET,
            }
        } else {
            ChildNumber::Normal { index: raw }
        }
    }

    /// The raw wire index with the hardened bit applied.
    pub fn to_raw(self) -> u32 {
        match self {
            ChildNumber::Normal { index } => index,
            ChildNumber::Hardened { index } => index + HARDENED_OFFSET,
        }
    }

    pub fn is_hardened(self) -> bool {
        matches!(self, ChildNumber::Hardened { .. })
    }
}

impl fmt::Display for ChildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildNumber::Normal { index } => write!(f, "{index}"),
            ChildNumber::Hardened { index } => write!(f, "{index}'"),
        }
    }
}

impl FromStr for ChildNumber {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, hardened) = match s.strip_suffix('\'').or_else(|| s.strip_suffix('h')) {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::InvalidDerivationPath(format!(
                "invalid path component {s:?}"
            )));
        }
        let index: u32 = digits.parse().map_err(|_| {
            WalletError::InvalidDerivationPath(format!("index {digits} too large"))
        })?;
        if hardened {
            ChildNumber::hardened(index)
        } else {
            ChildNumber::normal(index)
        }
    }
}

/// An ordered sequence of derivation steps, written `m/44'/0'/0'/0/0`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DerivationPath(Vec<ChildNumber>);

impl DerivationPath {
    /// The master path `m`.
    pub fn master() -> Self {
        DerivationPath(Vec::new())
    }

    pub fn steps(&self) -> &[ChildNumber] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The path extended by one step.
    pub fn child(&self, step: ChildNumber) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        DerivationPath(steps)
    }
}

impl From<Vec<ChildNumber>> for DerivationPath {
    fn from(steps: Vec<ChildNumber>) -> Self {
        DerivationPath(steps)
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('m')
            .ok_or_else(|| WalletError::InvalidDerivationPath(format!("{s:?} must start with m")))?;
        if rest.is_empty() {
            return Ok(DerivationPath::master());
        }
        let rest = rest.strip_prefix('/').ok_or_else(|| {
            WalletError::InvalidDerivationPath(format!("{s:?} missing / after m"))
        })?;
        let steps = rest
            .split('/')
            .map(ChildNumber::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DerivationPath(steps))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for step in &self.0 {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bip44_path() {
        let path: DerivationPath = "m/44'/0'/0'/0/0".parse().unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.steps()[0], ChildNumber::Hardened { index: 44 });
        assert_eq!(path.steps()[3], ChildNumber::Normal { index: 0 });
        assert_eq!(path.to_string(), "m/44'/0'/0'/0/0");
    }

    #[test]
    fn parse_accepts_h_suffix() {
        let a: DerivationPath = "m/84h/0h/0h/0/5".parse().unwrap();
        let b: DerivationPath = "m/84'/0'/0'/0/5".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn master_path() {
        let path: DerivationPath = "m".parse().unwrap();
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "m");
        assert_eq!(path, DerivationPath::master());
    }

    #[test]
    fn malformed_paths_rejected() {
        for bad in ["", "44'/0'", "m//0", "m/abc", "m/0''", "m/", "m/0/"] {
            assert!(
                bad.parse::<DerivationPath>().is_err(),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn raw_index_boundary() {
        // 2^31 - 1 is the last non-hardened index; 2^31 is hardened 0.
        assert_eq!(
            ChildNumber::from_raw((1 << 31) - 1),
            ChildNumber::Normal {
                index: (1 << 31) - 1
            }
        );
        assert_eq!(
            ChildNumber::from_raw(1 << 31),
            ChildNumber::Hardened { index: 0 }
        );
        assert_eq!(ChildNumber::from_raw(u32::MAX).to_raw(), u32::MAX);
    }

    #[test]
    fn offset_form_rejects_out_of_range() {
        assert!(matches!(
            ChildNumber::hardened(1 << 31),
            Err(WalletError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            ChildNumber::normal(u32::MAX),
            Err(WalletError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn hardened_raw_form() {
        assert_eq!(ChildNumber::hardened(0).unwrap().to_raw(), 1 << 31);
        assert_eq!(ChildNumber::normal(7).unwrap().to_raw(), 7);
        assert!(ChildNumber::hardened(44).unwrap().is_hardened());
        assert!(!ChildNumber::normal(44).unwrap().is_hardened());
    }

    #[test]
    fn child_extends_path() {
        let base: DerivationPath = "m/84'/0'/0'".parse().unwrap();
        let ext = base.child(ChildNumber::normal(0).unwrap());
        assert_eq!(ext.to_string(), "m/84'/0'/0'/0");
    }
}
