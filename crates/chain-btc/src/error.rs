use thiserror::Error;

/// Bitcoin engine errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("invalid multisig threshold: {required} of {total}")]
    InvalidThreshold { required: usize, total: usize },

    #[error("negative amount: {0}")]
    NegativeAmount(i64),

    #[error("amount overflow")]
    AmountOverflow,

    #[error("transaction has no inputs or no outputs")]
    EmptyTransaction,

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid psbt: {0}")]
    InvalidPsbt(String),

    #[error("input index {index} out of bounds (transaction has {len} inputs)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("input {input}: {have} of {need} required signatures present")]
    InsufficientSignatures {
        input: usize,
        have: usize,
        need: usize,
    },

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_checksum_mismatch() {
        assert_eq!(BtcError::ChecksumMismatch.to_string(), "checksum mismatch");
    }

    #[test]
    fn display_invalid_threshold() {
        let err = BtcError::InvalidThreshold {
            required: 4,
            total: 3,
        };
        assert_eq!(err.to_string(), "invalid multisig threshold: 4 of 3");
    }

    #[test]
    fn display_insufficient_signatures() {
        let err = BtcError::InsufficientSignatures {
            input: 0,
            have: 1,
            need: 2,
        };
        assert_eq!(
            err.to_string(),
            "input 0: 1 of 2 required signatures present"
        );
    }

    #[test]
    fn display_index_out_of_bounds() {
        let err = BtcError::IndexOutOfBounds { index: 5, len: 2 };
        assert!(err.to_string().contains("index 5"));
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> = Box::new(BtcError::AmountOverflow);
        assert_eq!(err.to_string(), "amount overflow");
    }
}
