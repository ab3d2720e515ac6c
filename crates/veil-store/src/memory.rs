//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use veil_core::{Commitment, ContentId, CreatorId, TierId, TxHash};
use veil_perms::{AccessGrant, Tier};

use crate::error::{Result, StoreError};
use crate::records::{ClaimResult, ContentRecord, CreatorRecord, PaymentRecord, Resolution};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// trait method holds the lock for its whole body, so each is atomic.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    creators: HashMap<CreatorId, CreatorRecord>,

    /// Tiers keyed by (creator, tier).
    tiers: HashMap<(CreatorId, TierId), Tier>,

    content: HashMap<ContentId, ContentRecord>,

    /// The payment ledger, keyed by tx hash.
    payments: HashMap<TxHash, PaymentRecord>,

    /// Grants keyed by (commitment, creator).
    grants: HashMap<(Commitment, CreatorId), AccessGrant>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_creator(&self, creator: &CreatorRecord) -> Result<InsertResult> {
        let mut inner = self.write()?;
        if inner.creators.contains_key(&creator.id) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.creators.insert(creator.id.clone(), creator.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_creator(&self, id: &CreatorId) -> Result<Option<CreatorRecord>> {
        Ok(self.read()?.creators.get(id).cloned())
    }

    async fn upsert_tier(&self, tier: &Tier) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .tiers
            .insert((tier.creator_id.clone(), tier.id.clone()), tier.clone());
        Ok(())
    }

    async fn get_tier(&self, creator_id: &CreatorId, tier_id: &TierId) -> Result<Option<Tier>> {
        let inner = self.read()?;
        Ok(inner
            .tiers
            .get(&(creator_id.clone(), tier_id.clone()))
            .cloned())
    }

    async fn list_tiers(&self, creator_id: &CreatorId) -> Result<Vec<Tier>> {
        let inner = self.read()?;
        let mut tiers: Vec<Tier> = inner
            .tiers
            .values()
            .filter(|t| &t.creator_id == creator_id)
            .cloned()
            .collect();
        tiers.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        Ok(tiers)
    }

    async fn insert_content(&self, content: &ContentRecord) -> Result<InsertResult> {
        let mut inner = self.write()?;
        if inner.content.contains_key(&content.id) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.content.insert(content.id.clone(), content.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentRecord>> {
        Ok(self.read()?.content.get(id).cloned())
    }

    async fn list_content(&self, creator_id: &CreatorId) -> Result<Vec<ContentRecord>> {
        let inner = self.read()?;
        let mut items: Vec<ContentRecord> = inner
            .content
            .values()
            .filter(|c| &c.creator_id == creator_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn claim_payment(&self, record: &PaymentRecord) -> Result<ClaimResult> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.payments.get(&record.tx_hash) {
            return Ok(ClaimResult::Existing(existing.clone()));
        }
        inner.payments.insert(record.tx_hash.clone(), record.clone());
        Ok(ClaimResult::Claimed(record.clone()))
    }

    async fn get_payment(&self, tx_hash: &TxHash) -> Result<Option<PaymentRecord>> {
        Ok(self.read()?.payments.get(tx_hash).cloned())
    }

    async fn complete_payment(
        &self,
        tx_hash: &TxHash,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord> {
        let mut guard = self.write()?;
        let inner = &mut *guard;

        let record = inner
            .payments
            .get_mut(tx_hash)
            .ok_or_else(|| StoreError::NotFound(format!("payment {}", tx_hash)))?;
        if record.is_final() {
            return Ok(record.clone());
        }

        let mut updated = record.clone();
        let key = match resolution {
            Resolution::Grant { commitment, .. } => Some((*commitment, updated.creator_id.clone())),
            Resolution::Reject(_) => None,
        };
        let current = key.as_ref().and_then(|k| inner.grants.get(k));
        let grant = updated.resolve(resolution, current, now)?;

        if let (Some(key), Some(grant)) = (key, grant) {
            inner.grants.insert(key, grant);
        }
        *record = updated.clone();
        Ok(updated)
    }

    async fn get_grant(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
    ) -> Result<Option<AccessGrant>> {
        let inner = self.read()?;
        Ok(inner.grants.get(&(*commitment, creator_id.clone())).cloned())
    }

    async fn revoke_grant(&self, commitment: &Commitment, creator_id: &CreatorId) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.grants.get_mut(&(*commitment, creator_id.clone())) {
            Some(grant) => {
                grant.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_grants(&self, creator_id: &CreatorId) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .grants
            .keys()
            .filter(|(_, c)| c == creator_id)
            .count() as u64)
    }
}
