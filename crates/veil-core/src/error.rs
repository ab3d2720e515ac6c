//! Error types for Veil core.

use thiserror::Error;

/// General core errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Errors parsing secrets and commitments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitmentError {
    #[error("expected 64 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex encoding")]
    InvalidHex,
}

/// Memo encode/decode errors.
///
/// Every failure on the decode path is one of these; decoding never panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoError {
    #[error("memo is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("memo is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed memo: {0}")]
    Malformed(String),

    #[error("unsupported memo version: {0}")]
    UnsupportedVersion(u64),

    #[error("memo tier id is empty")]
    EmptyTierId,

    #[error("memo commitment is invalid: {0}")]
    InvalidCommitment(#[from] CommitmentError),
}
