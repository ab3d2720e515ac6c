//! Error types for Veil.

use thiserror::Error;

use veil_core::{ContentId, CreatorId, MemoError, TierId};
use veil_monitor::MonitorError;
use veil_perms::PermsError;
use veil_store::StoreError;

/// Errors that can occur during Veil operations.
#[derive(Debug, Error)]
pub enum VeilError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Key wrapping or grant error.
    #[error("permission error: {0}")]
    Permission(#[from] PermsError),

    /// Chain interface error.
    #[error("chain error: {0}")]
    Monitor(#[from] MonitorError),

    /// Memo could not be built.
    #[error("memo error: {0}")]
    Memo(#[from] MemoError),

    /// Creator not found.
    #[error("creator not found: {0}")]
    CreatorNotFound(CreatorId),

    /// Creator already onboarded.
    #[error("creator already exists: {0}")]
    CreatorExists(CreatorId),

    /// Tier not found for this creator.
    #[error("tier not found: {creator_id}/{tier_id}")]
    TierNotFound { creator_id: CreatorId, tier_id: TierId },

    /// Tier exists but is not accepting payments.
    #[error("tier inactive: {0}")]
    TierInactive(TierId),

    /// Content already published under this ID.
    #[error("content already exists: {0}")]
    ContentExists(ContentId),
}

impl VeilError {
    /// Whether repeating the call later may succeed, e.g. once storage or
    /// the chain node is reachable again.
    pub fn is_retryable(&self) -> bool {
        match self {
            VeilError::Store(e) => e.is_retryable(),
            VeilError::Monitor(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// The single answer to any failed access check.
///
/// Carries no cause, so expired, revoked and unknown commitments, tier
/// mismatches and key failures all look the same to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("access denied")]
pub struct AccessDenied;

/// Result type for Veil operations.
pub type Result<T> = std::result::Result<T, VeilError>;
