//! The service facade.
//!
//! `VeilService` ties storage, the key ring, the payment processor and the
//! access verifier together, and starts transaction monitors whose sink is
//! the processor.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use veil_core::{Commitment, ContentId, CreatorId, TierId};
use veil_monitor::{
    ChainClient, MemoDecryptor, MonitorConfig, MonitorHandle, TransactionMonitor,
};
use veil_perms::{ContentKey, SystemKey, Tier, TierAccessPolicy};
use veil_store::{ContentRecord, CreatorRecord, InsertResult, StoragePointer, Store};

use crate::error::{Result, VeilError};
use crate::keyring::KeyRing;
use crate::processor::{PaymentProcessor, ProcessorConfig};
use crate::verifier::AccessVerifier;

/// Configuration for the service.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub processor: ProcessorConfig,
    pub tier_policy: TierAccessPolicy,
    pub monitor: MonitorConfig,
}

/// The main service struct.
pub struct VeilService<S: Store> {
    store: Arc<S>,
    keys: KeyRing,
    processor: PaymentProcessor<S>,
    verifier: AccessVerifier<S>,
    monitor_config: MonitorConfig,
}

impl<S: Store + 'static> VeilService<S> {
    /// Create a new service instance.
    pub fn new(store: S, system_key: SystemKey, config: ServiceConfig) -> Self {
        let store = Arc::new(store);
        let keys = KeyRing::new(system_key);
        Self {
            processor: PaymentProcessor::new(store.clone(), config.processor),
            verifier: AccessVerifier::new(store.clone(), keys.clone(), config.tier_policy),
            store,
            keys,
            monitor_config: config.monitor,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn processor(&self) -> &PaymentProcessor<S> {
        &self.processor
    }

    pub fn verifier(&self) -> &AccessVerifier<S> {
        &self.verifier
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creator Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Onboard a creator: get a receiving address from the chain and create
    /// their sealed master key.
    pub async fn onboard_creator(
        &self,
        creator_id: CreatorId,
        chain: &dyn ChainClient,
    ) -> Result<CreatorRecord> {
        if self.store.get_creator(&creator_id).await?.is_some() {
            return Err(VeilError::CreatorExists(creator_id));
        }

        let account = chain.new_shielded_address().await?;
        let keys = self
            .keys
            .create_creator_keys(&creator_id, account.viewing_key.as_deref())?;
        let record = CreatorRecord {
            id: creator_id,
            shielded_address: account.address,
            sealed_master_key: keys.sealed_master_key,
            sealed_viewing_key: keys.sealed_viewing_key,
            created_at: Utc::now(),
        };

        match self.store.insert_creator(&record).await? {
            InsertResult::Inserted => {
                info!(creator = %record.id, address = %record.shielded_address, "creator onboarded");
                Ok(record)
            }
            InsertResult::AlreadyExists => Err(VeilError::CreatorExists(record.id)),
        }
    }

    /// The creator's chain viewing key, for building a memo decryptor.
    pub async fn viewing_key(&self, creator_id: &CreatorId) -> Result<Option<String>> {
        let creator = self.creator(creator_id).await?;
        Ok(self.keys.open_viewing_key(&creator)?)
    }

    /// Add or update a tier.
    pub async fn register_tier(&self, tier: Tier) -> Result<()> {
        self.creator(&tier.creator_id).await?;
        self.store.upsert_tier(&tier).await?;
        info!(creator = %tier.creator_id, tier = %tier.id, price = %tier.price, "tier registered");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Content Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish a content item and return its key.
    ///
    /// The plaintext key is handed out once here for encrypting the blob;
    /// only its sealed form is stored.
    pub async fn publish_content(
        &self,
        creator_id: &CreatorId,
        content_id: ContentId,
        tier_id: Option<TierId>,
        storage: StoragePointer,
    ) -> Result<(ContentRecord, ContentKey)> {
        let creator = self.creator(creator_id).await?;
        if let Some(tier_id) = &tier_id {
            if self.store.get_tier(creator_id, tier_id).await?.is_none() {
                return Err(VeilError::TierNotFound {
                    creator_id: creator_id.clone(),
                    tier_id: tier_id.clone(),
                });
            }
        }

        let (key, sealed_key) = self.keys.create_content_key(&creator, &content_id)?;
        let record = ContentRecord {
            id: content_id,
            creator_id: creator_id.clone(),
            tier_id,
            sealed_key,
            storage,
            created_at: Utc::now(),
        };

        match self.store.insert_content(&record).await? {
            InsertResult::Inserted => {
                info!(creator = %creator_id, content = %record.id, "content published");
                Ok((record, key))
            }
            InsertResult::AlreadyExists => Err(VeilError::ContentExists(record.id)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Revoke a grant. Returns false if the pair has no grant.
    pub async fn revoke_grant(&self, commitment: &Commitment, creator_id: &CreatorId) -> Result<bool> {
        let revoked = self.store.revoke_grant(commitment, creator_id).await?;
        if revoked {
            info!(creator = %creator_id, commitment = %commitment, "grant revoked");
        }
        Ok(revoked)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Monitoring
    // ─────────────────────────────────────────────────────────────────────────

    /// Start watching a creator's address. Confirmed payments go straight
    /// to the processor. Fails before spawning anything if the monitor
    /// settings are unusable.
    pub async fn watch(
        &self,
        creator_id: &CreatorId,
        chain: Arc<dyn ChainClient>,
        decryptor: Arc<dyn MemoDecryptor>,
    ) -> Result<MonitorHandle> {
        let creator = self.creator(creator_id).await?;
        let monitor = TransactionMonitor::new(
            creator.id,
            creator.shielded_address,
            chain,
            decryptor,
            Arc::new(self.processor.clone()),
            self.monitor_config.clone(),
        )?;
        Ok(monitor.spawn())
    }

    async fn creator(&self, creator_id: &CreatorId) -> Result<CreatorRecord> {
        self.store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| VeilError::CreatorNotFound(creator_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::Zatoshis;
    use veil_monitor::MemoryChain;
    use veil_perms::EncryptionKey;
    use veil_store::{MemoryStore, StorageProvider};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn service() -> VeilService<MemoryStore> {
        init_tracing();
        VeilService::new(
            MemoryStore::new(),
            SystemKey::new(EncryptionKey::generate()),
            ServiceConfig::default(),
        )
    }

    fn pointer() -> StoragePointer {
        StoragePointer {
            provider: StorageProvider::Arweave,
            hash: "ar://abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_onboard_creator() {
        let svc = service();
        let chain = MemoryChain::new();
        let record = svc.onboard_creator(CreatorId::from("alice"), &chain).await.unwrap();

        assert!(record.sealed_viewing_key.is_some());
        assert_eq!(svc.store().get_creator(&record.id).await.unwrap(), Some(record.clone()));
        assert!(svc.viewing_key(&record.id).await.unwrap().is_some());
        assert!(matches!(
            svc.onboard_creator(CreatorId::from("alice"), &chain).await,
            Err(VeilError::CreatorExists(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_content_validation() {
        let svc = service();
        let alice = CreatorId::from("alice");
        svc.onboard_creator(alice.clone(), &MemoryChain::new()).await.unwrap();

        assert!(matches!(
            svc.publish_content(&CreatorId::from("bob"), ContentId::from("x"), None, pointer()).await,
            Err(VeilError::CreatorNotFound(_))
        ));
        assert!(matches!(
            svc.publish_content(&alice, ContentId::from("x"), Some(TierId::from("gold")), pointer()).await,
            Err(VeilError::TierNotFound { .. })
        ));

        let (record, _key) = svc
            .publish_content(&alice, ContentId::from("x"), None, pointer())
            .await
            .unwrap();
        assert_eq!(record.storage.provider, StorageProvider::Arweave);
        assert!(matches!(
            svc.publish_content(&alice, ContentId::from("x"), None, pointer()).await,
            Err(VeilError::ContentExists(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_rejects_zero_poll_interval() {
        init_tracing();
        let svc = VeilService::new(
            MemoryStore::new(),
            SystemKey::new(EncryptionKey::generate()),
            ServiceConfig {
                monitor: MonitorConfig {
                    poll_interval: std::time::Duration::ZERO,
                    ..MonitorConfig::default()
                },
                ..ServiceConfig::default()
            },
        );
        let chain = Arc::new(MemoryChain::new());
        let alice = CreatorId::from("alice");
        svc.onboard_creator(alice.clone(), chain.as_ref()).await.unwrap();

        let result = svc
            .watch(&alice, chain.clone(), Arc::new(veil_monitor::PlaintextMemoDecryptor))
            .await;
        assert!(matches!(
            result,
            Err(VeilError::Monitor(veil_monitor::MonitorError::InvalidConfig(_)))
        ));
        assert_eq!(chain.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_register_tier_requires_creator() {
        let svc = service();
        let tier = Tier {
            id: TierId::from("basic"),
            creator_id: CreatorId::from("ghost"),
            name: "Basic".to_string(),
            price: Zatoshis::new(1),
            rank: 1,
            active: true,
        };
        assert!(matches!(
            svc.register_tier(tier).await,
            Err(VeilError::CreatorNotFound(_))
        ));
    }
}
