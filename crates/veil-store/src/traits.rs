//! Store trait: the abstract interface for Veil persistence.
//!
//! This trait keeps the processor and verifier storage-agnostic.
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use veil_core::{Commitment, ContentId, CreatorId, TierId, TxHash};
use veil_perms::{AccessGrant, Tier};

use crate::error::Result;
use crate::records::{ClaimResult, ContentRecord, CreatorRecord, PaymentRecord, Resolution};

/// Result of inserting a keyed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Record was inserted successfully.
    Inserted,
    /// A record with this key already exists (idempotent - not an error).
    AlreadyExists,
}

/// The Store trait: async interface for Veil persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Claim then complete**: a payment is first claimed with an
///   insert-if-absent on its tx hash, then completed with a compare-and-set
///   from `Seen`. The grant write is part of the completion, so a tx hash
///   yields at most one grant mutation no matter how many callers race.
/// - **One grant per pair**: grants are keyed by (commitment, creator).
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Creator Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a creator. Existing creators are left untouched.
    async fn insert_creator(&self, creator: &CreatorRecord) -> Result<InsertResult>;

    /// Get a creator by ID.
    async fn get_creator(&self, id: &CreatorId) -> Result<Option<CreatorRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Tier Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a tier.
    async fn upsert_tier(&self, tier: &Tier) -> Result<()>;

    /// Get a creator's tier.
    async fn get_tier(&self, creator_id: &CreatorId, tier_id: &TierId) -> Result<Option<Tier>>;

    /// List a creator's tiers ordered by rank.
    async fn list_tiers(&self, creator_id: &CreatorId) -> Result<Vec<Tier>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Content Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a content record. Existing content is left untouched.
    async fn insert_content(&self, content: &ContentRecord) -> Result<InsertResult>;

    /// Get a content record by ID.
    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentRecord>>;

    /// List a creator's content ordered by ID.
    async fn list_content(&self, creator_id: &CreatorId) -> Result<Vec<ContentRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Payment Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert `record` unless its tx hash is already known.
    ///
    /// This is the single mutual-exclusion point for payment processing.
    async fn claim_payment(&self, record: &PaymentRecord) -> Result<ClaimResult>;

    /// Get a payment by tx hash.
    async fn get_payment(&self, tx_hash: &TxHash) -> Result<Option<PaymentRecord>>;

    /// Atomically finish a `Seen` payment.
    ///
    /// If the record is still `Seen`, applies `resolution` (including the
    /// grant renewal) and returns the updated record. If another caller
    /// already finished it, returns that record unchanged.
    async fn complete_payment(
        &self,
        tx_hash: &TxHash,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the grant for a (commitment, creator) pair.
    async fn get_grant(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
    ) -> Result<Option<AccessGrant>>;

    /// Mark a grant revoked. Returns false if no grant exists.
    async fn revoke_grant(&self, commitment: &Commitment, creator_id: &CreatorId) -> Result<bool>;

    /// Number of grants (any state) held against a creator.
    async fn count_grants(&self, creator_id: &CreatorId) -> Result<u64>;
}
