//! Payment processing.
//!
//! A payment moves `Unseen → Seen → {Processed, Rejected}`:
//!
//! 1. The tx hash is claimed with an insert-if-absent. Whoever finds a
//!    finished record returns its stored outcome.
//! 2. The memo is decoded and checked against the creator's tier price.
//! 3. The verdict is written with a compare-and-set from `Seen`, together
//!    with the grant renewal. A caller that loses the race gets the
//!    winner's outcome.
//!
//! Rejection is final: a malformed memo or an underpayment never turns into
//! a grant on replay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use veil_core::memo::decode;
use veil_core::{CreatorId, MemoTemplate, ShieldedAddress, TierId, TxHash, Zatoshis};
use veil_monitor::{MonitorError, ObservedPayment, PaymentSink};
use veil_perms::SubscriptionPeriod;
use veil_store::{ClaimResult, PaymentOutcome, PaymentRecord, RejectReason, Resolution, Store, StoreError};

use crate::error::{Result, VeilError};

/// Processor settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Length of access bought by one payment.
    pub period: SubscriptionPeriod,
    /// How long a payment intent stays valid.
    pub intent_ttl: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            period: SubscriptionPeriod::default(),
            intent_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Everything a supporter needs to pay for a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub creator_id: CreatorId,
    pub tier_id: TierId,
    pub amount: Zatoshis,
    pub shielded_address: ShieldedAddress,
    pub memo_template: MemoTemplate,
    pub expires_at: DateTime<Utc>,
}

/// Validates payments and issues grants.
pub struct PaymentProcessor<S: Store> {
    store: Arc<S>,
    config: ProcessorConfig,
}

impl<S: Store> Clone for PaymentProcessor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> PaymentProcessor<S> {
    pub fn new(store: Arc<S>, config: ProcessorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Start a purchase of `tier_id`.
    pub async fn initiate(&self, creator_id: &CreatorId, tier_id: &TierId) -> Result<PaymentIntent> {
        self.initiate_at(creator_id, tier_id, Utc::now()).await
    }

    pub async fn initiate_at(
        &self,
        creator_id: &CreatorId,
        tier_id: &TierId,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent> {
        let creator = self
            .store
            .get_creator(creator_id)
            .await?
            .ok_or_else(|| VeilError::CreatorNotFound(creator_id.clone()))?;
        let tier = self
            .store
            .get_tier(creator_id, tier_id)
            .await?
            .ok_or_else(|| VeilError::TierNotFound {
                creator_id: creator_id.clone(),
                tier_id: tier_id.clone(),
            })?;
        if !tier.active {
            return Err(VeilError::TierInactive(tier.id));
        }

        let ttl = chrono::Duration::from_std(self.config.intent_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        Ok(PaymentIntent {
            creator_id: creator.id,
            tier_id: tier.id.clone(),
            amount: tier.price,
            shielded_address: creator.shielded_address,
            memo_template: MemoTemplate::new(tier.id, now),
            expires_at: now + ttl,
        })
    }

    /// Process one payment. Safe to call any number of times, concurrently
    /// included, for the same `tx_hash`.
    pub async fn process_payment(
        &self,
        tx_hash: &TxHash,
        creator_id: &CreatorId,
        raw_memo: &[u8],
        amount: Zatoshis,
    ) -> Result<PaymentOutcome> {
        self.process_payment_at(tx_hash, creator_id, raw_memo, amount, Utc::now())
            .await
    }

    pub async fn process_payment_at(
        &self,
        tx_hash: &TxHash,
        creator_id: &CreatorId,
        raw_memo: &[u8],
        amount: Zatoshis,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome> {
        if let Some(existing) = self.store.get_payment(tx_hash).await? {
            if existing.is_final() {
                debug!(tx = %tx_hash, "payment already processed");
                return stored_outcome(existing);
            }
        }

        if self.store.get_creator(creator_id).await?.is_none() {
            return Err(VeilError::CreatorNotFound(creator_id.clone()));
        }

        let fresh = PaymentRecord::seen(
            tx_hash.clone(),
            creator_id.clone(),
            raw_memo.to_vec(),
            amount,
            now,
        );
        let record = match self.store.claim_payment(&fresh).await? {
            ClaimResult::Claimed(record) => record,
            ClaimResult::Existing(record) if record.is_final() => {
                debug!(tx = %tx_hash, "payment finished by another caller");
                return stored_outcome(record);
            }
            // Claimed earlier but never completed; finish it from the
            // stored record.
            ClaimResult::Existing(record) => record,
        };

        let resolution = self.evaluate(&record).await?;
        let completed = self
            .store
            .complete_payment(tx_hash, &resolution, now)
            .await?;
        let outcome = stored_outcome(completed)?;

        match &outcome {
            PaymentOutcome::Granted(grant) => info!(
                tx = %tx_hash,
                creator = %grant.creator_id,
                commitment = %grant.commitment,
                tier = %grant.tier_id,
                valid_until = %grant.valid_until,
                "payment granted access"
            ),
            PaymentOutcome::Rejected(reason) => info!(
                tx = %tx_hash,
                creator = %creator_id,
                reason = %reason,
                "payment rejected"
            ),
        }
        Ok(outcome)
    }

    /// Decide what a claimed payment earns.
    async fn evaluate(&self, record: &PaymentRecord) -> Result<Resolution> {
        let memo = match decode(&record.raw_memo) {
            Ok(memo) => memo,
            Err(e) => return Ok(Resolution::Reject(RejectReason::InvalidMemo(e.to_string()))),
        };

        let tier = match self.store.get_tier(&record.creator_id, &memo.tier_id).await? {
            Some(tier) => tier,
            None => return Ok(Resolution::Reject(RejectReason::UnknownTier(memo.tier_id))),
        };
        if !tier.active {
            return Ok(Resolution::Reject(RejectReason::TierInactive(tier.id)));
        }
        if record.amount < tier.price {
            return Ok(Resolution::Reject(RejectReason::InsufficientPayment {
                required: tier.price,
                received: record.amount,
            }));
        }

        Ok(Resolution::Grant {
            commitment: memo.commitment,
            tier_id: tier.id,
            period: self.config.period,
        })
    }
}

fn stored_outcome(record: PaymentRecord) -> Result<PaymentOutcome> {
    record.outcome.ok_or_else(|| {
        VeilError::Store(StoreError::InvalidData(format!(
            "payment {} is final but has no outcome",
            record.tx_hash
        )))
    })
}

#[async_trait]
impl<S: Store + 'static> PaymentSink for PaymentProcessor<S> {
    async fn on_payment(&self, payment: ObservedPayment) -> veil_monitor::Result<()> {
        if let Err(e) = &payment.memo {
            debug!(tx = %payment.tx_hash, error = %e, "observed payment with undecodable memo");
        }
        self.process_payment(
            &payment.tx_hash,
            &payment.creator_id,
            &payment.raw_memo,
            payment.amount,
        )
        .await
        .map(|_| ())
        .map_err(|e| {
            if e.is_retryable() {
                MonitorError::Sink(e.to_string())
            } else {
                MonitorError::SinkRejected(e.to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use veil_core::{Commitment, MemoEnvelope, Secret};
    use veil_perms::{EncryptionKey, SealedKey, Tier};
    use veil_store::{CreatorRecord, MemoryStore, PaymentStatus};

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap()
    }

    async fn setup() -> PaymentProcessor<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let creator = CreatorId::from("alice");
        let key = EncryptionKey::generate();
        store
            .insert_creator(&CreatorRecord {
                id: creator.clone(),
                shielded_address: ShieldedAddress::from("zs1alice"),
                sealed_master_key: SealedKey::seal(b"k", &key, b"ctx").unwrap(),
                sealed_viewing_key: None,
                created_at: at(1),
            })
            .await
            .unwrap();
        for (id, price, active) in [("basic", 10_000_000, true), ("retired", 1, false)] {
            store
                .upsert_tier(&Tier {
                    id: TierId::from(id),
                    creator_id: creator.clone(),
                    name: id.to_string(),
                    price: Zatoshis::new(price),
                    rank: 1,
                    active,
                })
                .await
                .unwrap();
        }
        PaymentProcessor::new(store, ProcessorConfig::default())
    }

    fn memo(tier: &str, commitment: Commitment) -> Vec<u8> {
        MemoEnvelope::new(TierId::from(tier), "pk", commitment, at(1))
            .encode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_returns_intent() {
        let p = setup().await;
        let intent = p
            .initiate_at(&CreatorId::from("alice"), &TierId::from("basic"), at(2))
            .await
            .unwrap();

        assert_eq!(intent.amount, Zatoshis::new(10_000_000));
        assert_eq!(intent.shielded_address.as_str(), "zs1alice");
        assert_eq!(intent.memo_template.tier_id.as_str(), "basic");
        assert_eq!(intent.expires_at, at(2) + chrono::Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_initiate_errors() {
        let p = setup().await;
        let alice = CreatorId::from("alice");

        assert!(matches!(
            p.initiate(&CreatorId::from("nobody"), &TierId::from("basic")).await,
            Err(VeilError::CreatorNotFound(_))
        ));
        assert!(matches!(
            p.initiate(&alice, &TierId::from("gold")).await,
            Err(VeilError::TierNotFound { .. })
        ));
        assert!(matches!(
            p.initiate(&alice, &TierId::from("retired")).await,
            Err(VeilError::TierInactive(_))
        ));
    }

    #[tokio::test]
    async fn test_exact_price_grants() {
        let p = setup().await;
        let commitment = Secret::generate().commitment();
        let outcome = p
            .process_payment_at(
                &TxHash::from("tx1"),
                &CreatorId::from("alice"),
                &memo("basic", commitment),
                Zatoshis::new(10_000_000),
                at(5),
            )
            .await
            .unwrap();

        match outcome {
            PaymentOutcome::Granted(grant) => {
                assert_eq!(grant.commitment, commitment);
                assert_eq!(grant.valid_until, Utc.with_ymd_and_hms(2025, 4, 5, 12, 0, 0).unwrap());
            }
            other => panic!("expected grant, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejections() {
        let p = setup().await;
        let alice = CreatorId::from("alice");
        let c = Commitment::from_bytes([3; 32]);

        let cases = [
            ("tx-short", memo("basic", c), 9_999_999),
            ("tx-bad", b"not json".to_vec(), 10_000_000),
            ("tx-unknown", memo("gold", c), 10_000_000),
            ("tx-retired", memo("retired", c), 10_000_000),
        ];
        for (tx, raw, amount) in cases {
            let outcome = p
                .process_payment_at(&TxHash::from(tx), &alice, &raw, Zatoshis::new(amount), at(5))
                .await
                .unwrap();
            assert!(matches!(outcome, PaymentOutcome::Rejected(_)), "{}", tx);

            let record = p.store.get_payment(&TxHash::from(tx)).await.unwrap().unwrap();
            assert_eq!(record.status, PaymentStatus::Rejected);
        }
        assert!(p.store.get_grant(&c, &alice).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_returns_stored_outcome() {
        let p = setup().await;
        let alice = CreatorId::from("alice");
        let commitment = Commitment::from_bytes([4; 32]);
        let tx = TxHash::from("tx1");

        let first = p
            .process_payment_at(&tx, &alice, &memo("basic", commitment), Zatoshis::new(10_000_000), at(5))
            .await
            .unwrap();
        // Different amount and later clock: still the first outcome.
        let second = p
            .process_payment_at(&tx, &alice, b"", Zatoshis::new(1), at(20))
            .await
            .unwrap();

        assert_eq!(first, second);
        let grant = p.store.get_grant(&commitment, &alice).await.unwrap().unwrap();
        assert_eq!(PaymentOutcome::Granted(grant), first);
    }

    #[tokio::test]
    async fn test_unknown_creator_leaves_no_record() {
        let p = setup().await;
        let tx = TxHash::from("tx1");
        let result = p
            .process_payment(&tx, &CreatorId::from("nobody"), b"", Zatoshis::new(1))
            .await;

        assert!(matches!(result, Err(VeilError::CreatorNotFound(_))));
        assert!(p.store.get_payment(&tx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sink_classifies_permanent_errors() {
        let p = setup().await;
        let payment = |creator: &str| ObservedPayment {
            tx_hash: TxHash::from("tx-sink"),
            creator_id: CreatorId::from(creator),
            amount: Zatoshis::new(10_000_000),
            confirmations: 1,
            raw_memo: memo("basic", Commitment::from_bytes([9; 32])).into(),
            memo: Err(veil_core::MemoError::EmptyTierId),
        };

        let err = p.on_payment(payment("nobody")).await.unwrap_err();
        assert!(matches!(err, MonitorError::SinkRejected(_)));
        assert!(!err.is_retryable());

        p.on_payment(payment("alice")).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_payment_extends_grant() {
        let p = setup().await;
        let alice = CreatorId::from("alice");
        let commitment = Commitment::from_bytes([5; 32]);
        let raw = memo("basic", commitment);

        p.process_payment_at(&TxHash::from("tx1"), &alice, &raw, Zatoshis::new(10_000_000), at(1))
            .await
            .unwrap();
        p.process_payment_at(&TxHash::from("tx2"), &alice, &raw, Zatoshis::new(10_000_000), at(10))
            .await
            .unwrap();

        let grant = p.store.get_grant(&commitment, &alice).await.unwrap().unwrap();
        assert_eq!(grant.valid_from, at(1));
        assert_eq!(grant.valid_until, Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap());
        assert_eq!(p.store.count_grants(&alice).await.unwrap(), 1);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn underpayment_never_grants(
            amount in 0u64..10_000_000,
            seed in proptest::array::uniform32(proptest::num::u8::ANY),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let p = setup().await;
                let alice = CreatorId::from("alice");
                let commitment = Commitment::from_bytes(seed);
                let outcome = p
                    .process_payment_at(
                        &TxHash::from("tx"),
                        &alice,
                        &memo("basic", commitment),
                        Zatoshis::new(amount),
                        at(5),
                    )
                    .await
                    .unwrap();

                assert!(matches!(
                    outcome,
                    PaymentOutcome::Rejected(RejectReason::InsufficientPayment { .. })
                ));
                assert!(p.store.get_grant(&commitment, &alice).await.unwrap().is_none());
            });
        }
    }
}
