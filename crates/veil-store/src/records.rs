//! Durable record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veil_core::{Commitment, ContentId, CreatorId, ShieldedAddress, TierId, TxHash, Zatoshis};
use veil_perms::{AccessGrant, SealedKey, SubscriptionPeriod};

use crate::error::{Result, StoreError};

/// An onboarded creator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatorRecord {
    pub id: CreatorId,
    /// Address supporters pay to; watched by the monitor.
    pub shielded_address: ShieldedAddress,
    /// Master key sealed under the system key.
    pub sealed_master_key: SealedKey,
    /// Chain viewing key sealed under the system key, if the chain exported one.
    pub sealed_viewing_key: Option<SealedKey>,
    pub created_at: DateTime<Utc>,
}

/// Where a content item's ciphertext lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Ipfs,
    S3,
    Arweave,
}

impl StorageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageProvider::Ipfs => "ipfs",
            StorageProvider::S3 => "s3",
            StorageProvider::Arweave => "arweave",
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageProvider {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ipfs" => Ok(StorageProvider::Ipfs),
            "s3" => Ok(StorageProvider::S3),
            "arweave" => Ok(StorageProvider::Arweave),
            other => Err(StoreError::InvalidData(format!("unknown storage provider: {}", other))),
        }
    }
}

/// Pointer to an external content blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePointer {
    pub provider: StorageProvider,
    pub hash: String,
}

/// A published content item. Its key is only stored sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: ContentId,
    pub creator_id: CreatorId,
    /// `None` means readable by any supporter with a valid grant.
    pub tier_id: Option<TierId>,
    /// Content key sealed under the creator's master key.
    pub sealed_key: SealedKey,
    pub storage: StoragePointer,
    pub created_at: DateTime<Utc>,
}

/// Processing state of a payment.
///
/// `Seen` is entered on the first sighting of a tx hash; `Processed` and
/// `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentStatus {
    Seen = 0,
    Processed = 1,
    Rejected = 2,
}

impl PaymentStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(PaymentStatus::Seen),
            1 => Some(PaymentStatus::Processed),
            2 => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

/// Why a payment did not produce a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InvalidMemo(String),
    UnknownTier(TierId),
    TierInactive(TierId),
    InsufficientPayment { required: Zatoshis, received: Zatoshis },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidMemo(msg) => write!(f, "invalid memo: {}", msg),
            RejectReason::UnknownTier(tier) => write!(f, "unknown tier: {}", tier),
            RejectReason::TierInactive(tier) => write!(f, "tier inactive: {}", tier),
            RejectReason::InsufficientPayment { required, received } => {
                write!(f, "insufficient payment: required {}, received {}", required, received)
            }
        }
    }
}

/// The stored result of processing a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    Granted(AccessGrant),
    Rejected(RejectReason),
}

/// The idempotency ledger entry for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub tx_hash: TxHash,
    pub creator_id: CreatorId,
    pub raw_memo: Vec<u8>,
    pub amount: Zatoshis,
    pub status: PaymentStatus,
    /// Set exactly when `status` is terminal.
    pub outcome: Option<PaymentOutcome>,
    pub seen_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// A freshly sighted payment.
    pub fn seen(
        tx_hash: TxHash,
        creator_id: CreatorId,
        raw_memo: Vec<u8>,
        amount: Zatoshis,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tx_hash,
            creator_id,
            raw_memo,
            amount,
            status: PaymentStatus::Seen,
            outcome: None,
            seen_at: now,
            processed_at: None,
        }
    }

    /// Whether processing has finished (granted or rejected).
    pub fn is_final(&self) -> bool {
        self.status != PaymentStatus::Seen
    }

    /// Apply a resolution to a `Seen` record.
    ///
    /// Returns the grant to persist, if any. Backends call this inside their
    /// atomic completion step with the current grant for the pair.
    pub fn resolve(
        &mut self,
        resolution: &Resolution,
        current_grant: Option<&AccessGrant>,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessGrant>> {
        let grant = match resolution {
            Resolution::Grant {
                commitment,
                tier_id,
                period,
            } => {
                let grant = AccessGrant::renew(
                    current_grant,
                    *commitment,
                    self.creator_id.clone(),
                    tier_id.clone(),
                    *period,
                    now,
                )?;
                self.status = PaymentStatus::Processed;
                self.outcome = Some(PaymentOutcome::Granted(grant.clone()));
                Some(grant)
            }
            Resolution::Reject(reason) => {
                self.status = PaymentStatus::Rejected;
                self.outcome = Some(PaymentOutcome::Rejected(reason.clone()));
                None
            }
        };
        self.processed_at = Some(now);
        Ok(grant)
    }
}

/// The processor's verdict, handed to [`Store::complete_payment`](crate::Store::complete_payment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Issue or extend the grant for `commitment` on the payment's creator.
    Grant {
        commitment: Commitment,
        tier_id: TierId,
        period: SubscriptionPeriod,
    },
    Reject(RejectReason),
}

/// Result of claiming a transaction hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// The record was new and is now `Seen`.
    Claimed(PaymentRecord),
    /// A record already existed; it is returned unchanged.
    Existing(PaymentRecord),
}

impl ClaimResult {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            ClaimResult::Claimed(r) | ClaimResult::Existing(r) => r,
        }
    }

    pub fn into_record(self) -> PaymentRecord {
        match self {
            ClaimResult::Claimed(r) | ClaimResult::Existing(r) => r,
        }
    }
}
