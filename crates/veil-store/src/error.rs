//! Storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A CBOR column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An update targeted a record that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored value no longer parses as its domain type.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("grant error: {0}")]
    Perms(#[from] veil_perms::PermsError),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// The blocking database task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Whether the operation may succeed if repeated later. Undecodable or
    /// missing data stays that way, and so does a poisoned lock.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Task(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Database(rusqlite::Error::InvalidQuery).is_retryable());
        assert!(StoreError::Task("cancelled".into()).is_retryable());
        assert!(!StoreError::InvalidData("bad status".into()).is_retryable());
        assert!(!StoreError::Serialization("eof".into()).is_retryable());
        assert!(!StoreError::LockPoisoned("store".into()).is_retryable());
    }
}
