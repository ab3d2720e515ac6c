//! Error types for the chain interface and monitor.

use std::time::Duration;

use thiserror::Error;

/// Errors from the chain interface, memo decryption, or payment delivery.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The chain node could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// A chain call did not finish in time.
    #[error("chain call timed out after {0:?}")]
    Timeout(Duration),

    /// The node answered with a JSON-RPC error.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered with something we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The memo could not be decrypted with the available key material.
    #[error("memo decryption failed: {0}")]
    MemoDecryption(String),

    /// The payment sink could not handle the payment right now.
    #[error("payment sink failed: {0}")]
    Sink(String),

    /// The payment sink will never accept this payment.
    #[error("payment sink refused payment: {0}")]
    SinkRejected(String),

    /// Monitor settings that cannot work.
    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),
}

/// RPC code zcashd returns while still loading the block index.
const RPC_IN_WARMUP: i64 = -28;

impl MonitorError {
    /// Whether the same call may succeed on a later tick.
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::Connection(_) | MonitorError::Timeout(_) | MonitorError::Sink(_) => true,
            MonitorError::Rpc { code, .. } => *code == RPC_IN_WARMUP,
            MonitorError::InvalidResponse(_)
            | MonitorError::MemoDecryption(_)
            | MonitorError::SinkRejected(_)
            | MonitorError::InvalidConfig(_) => false,
        }
    }
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(MonitorError::Connection("refused".into()).is_retryable());
        assert!(MonitorError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(MonitorError::Rpc { code: -28, message: "Loading".into() }.is_retryable());
        assert!(!MonitorError::Rpc { code: -5, message: "bad address".into() }.is_retryable());
        assert!(!MonitorError::MemoDecryption("no key".into()).is_retryable());
        assert!(MonitorError::Sink("db down".into()).is_retryable());
        assert!(!MonitorError::SinkRejected("unknown creator".into()).is_retryable());
    }
}
