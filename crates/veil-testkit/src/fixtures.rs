//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a service with one onboarded
//! creator, two tiers and three content items.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use veil::{ServiceConfig, VeilService};
use veil_core::{ContentId, CreatorId, MemoEnvelope, Secret, TierId, Zatoshis};
use veil_monitor::MemoryChain;
use veil_perms::{ContentKey, EncryptionKey, SystemKey, Tier};
use veil_store::{CreatorRecord, MemoryStore, StoragePointer, StorageProvider, Store};

/// Price of the `basic` tier: 0.1 ZEC.
pub const BASIC_PRICE: Zatoshis = Zatoshis::new(10_000_000);

/// Price of the `premium` tier: 0.25 ZEC.
pub const PREMIUM_PRICE: Zatoshis = Zatoshis::new(25_000_000);

/// A service with one creator (`alice`) and published content:
///
/// | content | tier |
/// |---|---|
/// | `welcome` | none |
/// | `basic-post` | `basic` |
/// | `premium-post` | `premium` |
pub struct TestFixture<S: Store + 'static = MemoryStore> {
    pub service: VeilService<S>,
    pub chain: Arc<MemoryChain>,
    pub creator: CreatorRecord,
    pub content_keys: BTreeMap<ContentId, ContentKey>,
}

impl TestFixture<MemoryStore> {
    /// Create a fixture on a memory store with default configuration.
    pub async fn new() -> Self {
        Self::with_config(ServiceConfig::default()).await
    }

    pub async fn with_config(config: ServiceConfig) -> Self {
        Self::with_store(MemoryStore::new(), config).await
    }
}

impl<S: Store + 'static> TestFixture<S> {
    /// Build the fixture on `store`.
    ///
    /// # Panics
    ///
    /// Panics if any setup step fails.
    pub async fn with_store(store: S, config: ServiceConfig) -> Self {
        let service = VeilService::new(store, SystemKey::new(EncryptionKey::generate()), config);
        let chain = Arc::new(MemoryChain::new());
        let creator = service
            .onboard_creator(CreatorId::from("alice"), chain.as_ref())
            .await
            .expect("onboard creator");

        for (id, name, price, rank) in [
            ("basic", "Basic", BASIC_PRICE, 1),
            ("premium", "Premium", PREMIUM_PRICE, 2),
        ] {
            service
                .register_tier(Tier {
                    id: TierId::from(id),
                    creator_id: creator.id.clone(),
                    name: name.to_string(),
                    price,
                    rank,
                    active: true,
                })
                .await
                .expect("register tier");
        }

        let mut content_keys = BTreeMap::new();
        for (id, tier) in [
            ("welcome", None),
            ("basic-post", Some("basic")),
            ("premium-post", Some("premium")),
        ] {
            let (record, key) = service
                .publish_content(
                    &creator.id,
                    ContentId::from(id),
                    tier.map(TierId::from),
                    StoragePointer {
                        provider: StorageProvider::Ipfs,
                        hash: format!("bafy{}", id),
                    },
                )
                .await
                .expect("publish content");
            content_keys.insert(record.id, key);
        }

        Self {
            service,
            chain,
            creator,
            content_keys,
        }
    }

    pub fn creator_id(&self) -> &CreatorId {
        &self.creator.id
    }

    /// The key handed out when `content_id` was published.
    pub fn content_key(&self, content_id: &str) -> &ContentKey {
        &self.content_keys[&ContentId::from(content_id)]
    }

    /// Encoded memo a supporter holding `secret` would attach for `tier`.
    pub fn supporter_memo(&self, secret: &Secret, tier: &str) -> Vec<u8> {
        MemoEnvelope::new(TierId::from(tier), "supporter-pk", secret.commitment(), Utc::now())
            .encode()
            .expect("encode memo")
    }

    /// Deliver a payment to the creator's address on the in-memory chain.
    pub fn send_payment(&self, tx_hash: &str, amount: Zatoshis, memo: Vec<u8>, confirmations: u32) {
        self.chain
            .add_transaction(&self.creator.shielded_address, tx_hash, amount, confirmations, memo)
            .expect("add transaction");
    }
}
