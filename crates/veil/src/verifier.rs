//! Access verification and content key release.
//!
//! Every failed check returns the same [`AccessDenied`]. Whether the
//! commitment never paid, expired, was revoked, asked for the wrong tier,
//! or hit a key failure is only visible in logs.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use veil_core::{Commitment, ContentId, CreatorId, TierId};
use veil_perms::{AccessGrant, ContentKey, PermsError, Tier, TierAccessPolicy};
use veil_store::{Store, StoreError};

use crate::error::{AccessDenied, Result};
use crate::keyring::KeyRing;

/// Answer to an access status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessReport {
    pub valid: bool,
    pub valid_until: Option<DateTime<Utc>>,
    pub tier_id: Option<TierId>,
    pub accessible_content: BTreeSet<ContentId>,
}

impl AccessReport {
    fn denied() -> Self {
        Self {
            valid: false,
            valid_until: None,
            tier_id: None,
            accessible_content: BTreeSet::new(),
        }
    }
}

/// Internal cause of a denial. Never leaves this module.
#[derive(Debug, Error)]
enum Denial {
    #[error("no valid grant")]
    NoGrant,
    #[error("content not found")]
    UnknownContent,
    #[error("content belongs to another creator")]
    ForeignContent,
    #[error("content tier not covered by grant")]
    TierMismatch,
    #[error("creator not found")]
    MissingCreator,
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error("key unwrap: {0}")]
    Key(#[from] PermsError),
}

/// Answers entitlement queries by commitment.
pub struct AccessVerifier<S: Store> {
    store: Arc<S>,
    keys: KeyRing,
    policy: TierAccessPolicy,
}

impl<S: Store> Clone for AccessVerifier<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            keys: self.keys.clone(),
            policy: self.policy,
        }
    }
}

impl<S: Store> AccessVerifier<S> {
    pub fn new(store: Arc<S>, keys: KeyRing, policy: TierAccessPolicy) -> Self {
        Self { store, keys, policy }
    }

    pub fn policy(&self) -> TierAccessPolicy {
        self.policy
    }

    /// The commitment's current grant on `creator_id`, if it is valid.
    pub async fn verify_access(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
    ) -> std::result::Result<AccessGrant, AccessDenied> {
        self.verify_access_at(commitment, creator_id, Utc::now()).await
    }

    pub async fn verify_access_at(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
        now: DateTime<Utc>,
    ) -> std::result::Result<AccessGrant, AccessDenied> {
        self.valid_grant(commitment, creator_id, now)
            .await
            .map_err(|cause| deny(commitment, cause))
    }

    /// Content a grant unlocks under the configured policy.
    ///
    /// Does not check the grant's validity.
    pub async fn resolve_accessible_content(
        &self,
        grant: &AccessGrant,
    ) -> Result<BTreeSet<ContentId>> {
        let tiers = self.policy_tiers(&grant.creator_id).await?;
        let content = self.store.list_content(&grant.creator_id).await?;
        Ok(content
            .into_iter()
            .filter(|c| self.policy.allows(&grant.tier_id, c.tier_id.as_ref(), &tiers))
            .map(|c| c.id)
            .collect())
    }

    /// Entitlement summary. A denied commitment gets the same empty report
    /// whatever the reason.
    pub async fn check_access(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
    ) -> Result<AccessReport> {
        self.check_access_at(commitment, creator_id, Utc::now()).await
    }

    pub async fn check_access_at(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
        now: DateTime<Utc>,
    ) -> Result<AccessReport> {
        let grant = match self.verify_access_at(commitment, creator_id, now).await {
            Ok(grant) => grant,
            Err(AccessDenied) => return Ok(AccessReport::denied()),
        };
        let accessible_content = self.resolve_accessible_content(&grant).await?;
        Ok(AccessReport {
            valid: true,
            valid_until: Some(grant.valid_until),
            tier_id: Some(grant.tier_id),
            accessible_content,
        })
    }

    /// Release the key for `content_id` to a commitment entitled to it.
    pub async fn prove_access(
        &self,
        commitment: &Commitment,
        content_id: &ContentId,
        creator_id: &CreatorId,
    ) -> std::result::Result<ContentKey, AccessDenied> {
        self.prove_access_at(commitment, content_id, creator_id, Utc::now())
            .await
    }

    pub async fn prove_access_at(
        &self,
        commitment: &Commitment,
        content_id: &ContentId,
        creator_id: &CreatorId,
        now: DateTime<Utc>,
    ) -> std::result::Result<ContentKey, AccessDenied> {
        self.try_prove(commitment, content_id, creator_id, now)
            .await
            .map_err(|cause| deny(commitment, cause))
    }

    async fn try_prove(
        &self,
        commitment: &Commitment,
        content_id: &ContentId,
        creator_id: &CreatorId,
        now: DateTime<Utc>,
    ) -> std::result::Result<ContentKey, Denial> {
        let grant = self.valid_grant(commitment, creator_id, now).await?;

        let content = self
            .store
            .get_content(content_id)
            .await?
            .ok_or(Denial::UnknownContent)?;
        if &content.creator_id != creator_id {
            return Err(Denial::ForeignContent);
        }

        let tiers = self.policy_tiers(creator_id).await?;
        if !self
            .policy
            .allows(&grant.tier_id, content.tier_id.as_ref(), &tiers)
        {
            return Err(Denial::TierMismatch);
        }

        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or(Denial::MissingCreator)?;
        Ok(self.keys.open_content_key(&creator, &content)?)
    }

    async fn valid_grant(
        &self,
        commitment: &Commitment,
        creator_id: &CreatorId,
        now: DateTime<Utc>,
    ) -> std::result::Result<AccessGrant, Denial> {
        match self.store.get_grant(commitment, creator_id).await? {
            Some(grant) if grant.is_valid(now) => Ok(grant),
            _ => Err(Denial::NoGrant),
        }
    }

    /// Tier list for rank lookups; exact matching never needs one.
    async fn policy_tiers(&self, creator_id: &CreatorId) -> std::result::Result<Vec<Tier>, StoreError> {
        match self.policy {
            TierAccessPolicy::ExactMatch => Ok(Vec::new()),
            TierAccessPolicy::OrderedSuperset => self.store.list_tiers(creator_id).await,
        }
    }
}

fn deny(commitment: &Commitment, cause: Denial) -> AccessDenied {
    match &cause {
        Denial::Store(_) | Denial::Key(_) => {
            warn!(commitment = %commitment, cause = %cause, "access check failed")
        }
        _ => debug!(commitment = %commitment, cause = %cause, "access denied"),
    }
    AccessDenied
}
