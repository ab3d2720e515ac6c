//! End-to-end payment-to-access scenarios.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use veil::{AccessDenied, PaymentOutcome, ServiceConfig};
use veil_core::{ContentId, Secret, TxHash, Zatoshis};
use veil_monitor::{MonitorConfig, PlaintextMemoDecryptor};
use veil_perms::TierAccessPolicy;
use veil_store::{PaymentStatus, RejectReason, SqliteStore, Store};
use veil_testkit::{TestFixture, BASIC_PRICE};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scenario_secret() -> Secret {
    Secret::from_hex("7f3c9e2a5b1d4f6087a9c3e5b7d1f2a4c6e8b0d2f4a6c8e0b2d4f6a8c0e2b4d6").unwrap()
}

#[tokio::test]
async fn scenario_a_exact_payment_grants_one_month() {
    init_tracing();
    let fixture = TestFixture::new().await;
    let processor = fixture.service.processor();
    let secret = scenario_secret();

    let intent = processor
        .initiate(fixture.creator_id(), &"basic".into())
        .await
        .unwrap();
    assert_eq!(intent.amount, Zatoshis::from_zec_str("0.1").unwrap());
    let memo = intent
        .memo_template
        .finalize(secret.commitment(), "supporter-pk", None)
        .encode()
        .unwrap();

    let before = Utc::now();
    let outcome = processor
        .process_payment(&TxHash::from("tx-a"), fixture.creator_id(), &memo, intent.amount)
        .await
        .unwrap();
    assert!(matches!(outcome, PaymentOutcome::Granted(_)));

    let grant = fixture
        .service
        .verifier()
        .verify_access(&secret.commitment(), fixture.creator_id())
        .await
        .unwrap();
    assert!(grant.valid_until >= before + chrono::Duration::days(28));
    assert!(grant.valid_until <= Utc::now() + chrono::Duration::days(31));

    let report = fixture
        .service
        .verifier()
        .check_access(&secret.commitment(), fixture.creator_id())
        .await
        .unwrap();
    assert!(report.valid);
    assert!(report.accessible_content.contains(&ContentId::from("basic-post")));
    assert!(report.accessible_content.contains(&ContentId::from("welcome")));
    assert!(!report.accessible_content.contains(&ContentId::from("premium-post")));
}

#[tokio::test]
async fn scenario_b_underpayment_is_rejected() {
    let fixture = TestFixture::new().await;
    let secret = scenario_secret();
    let memo = fixture.supporter_memo(&secret, "basic");

    let outcome = fixture
        .service
        .processor()
        .process_payment(
            &TxHash::from("tx-b"),
            fixture.creator_id(),
            &memo,
            Zatoshis::from_zec_str("0.05").unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PaymentOutcome::Rejected(RejectReason::InsufficientPayment {
            required: BASIC_PRICE,
            received: Zatoshis::new(5_000_000),
        })
    );
    assert_eq!(
        fixture
            .service
            .verifier()
            .verify_access(&secret.commitment(), fixture.creator_id())
            .await,
        Err(AccessDenied)
    );
}

#[tokio::test]
async fn scenario_c_replay_yields_same_outcome_and_one_grant() {
    let fixture = TestFixture::new().await;
    let processor = fixture.service.processor();
    let secret = scenario_secret();
    let memo = fixture.supporter_memo(&secret, "basic");
    let tx = TxHash::from("tx-c");

    let first = processor
        .process_payment(&tx, fixture.creator_id(), &memo, BASIC_PRICE)
        .await
        .unwrap();
    let second = processor
        .process_payment(&tx, fixture.creator_id(), &memo, Zatoshis::new(1))
        .await
        .unwrap();

    assert_eq!(first, second);
    let grant = fixture
        .service
        .store()
        .get_grant(&secret.commitment(), fixture.creator_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(PaymentOutcome::Granted(grant), first);
    assert_eq!(fixture.service.store().count_grants(fixture.creator_id()).await.unwrap(), 1);
}

#[tokio::test]
async fn replay_on_sqlite_matches_stored_grant() {
    let fixture = TestFixture::with_store(SqliteStore::open_memory().unwrap(), ServiceConfig::default()).await;
    let processor = fixture.service.processor();
    let secret = scenario_secret();
    let memo = fixture.supporter_memo(&secret, "basic");
    let tx = TxHash::from("tx-c-sqlite");

    let first = processor
        .process_payment(&tx, fixture.creator_id(), &memo, BASIC_PRICE)
        .await
        .unwrap();
    let second = processor
        .process_payment(&tx, fixture.creator_id(), &memo, Zatoshis::new(1))
        .await
        .unwrap();
    assert_eq!(first, second);

    let grant = fixture
        .service
        .verifier()
        .verify_access(&secret.commitment(), fixture.creator_id())
        .await
        .unwrap();
    assert_eq!(PaymentOutcome::Granted(grant), first);
}

#[tokio::test]
async fn scenario_d_tier_mismatch_denies_content_key() {
    let fixture = TestFixture::new().await;
    let secret = scenario_secret();
    let memo = fixture.supporter_memo(&secret, "basic");
    fixture
        .service
        .processor()
        .process_payment(&TxHash::from("tx-d"), fixture.creator_id(), &memo, BASIC_PRICE)
        .await
        .unwrap();

    let verifier = fixture.service.verifier();
    assert!(verifier
        .verify_access(&secret.commitment(), fixture.creator_id())
        .await
        .is_ok());
    assert_eq!(
        verifier
            .prove_access(&secret.commitment(), &ContentId::from("premium-post"), fixture.creator_id())
            .await,
        Err(AccessDenied)
    );

    let key = verifier
        .prove_access(&secret.commitment(), &ContentId::from("basic-post"), fixture.creator_id())
        .await
        .unwrap();
    assert_eq!(&key, fixture.content_key("basic-post"));
}

#[tokio::test]
async fn ordered_superset_policy_unlocks_lower_tiers() {
    let fixture = TestFixture::with_config(ServiceConfig {
        tier_policy: TierAccessPolicy::OrderedSuperset,
        ..ServiceConfig::default()
    })
    .await;
    let secret = scenario_secret();
    let memo = fixture.supporter_memo(&secret, "premium");
    fixture
        .service
        .processor()
        .process_payment(&TxHash::from("tx"), fixture.creator_id(), &memo, Zatoshis::new(25_000_000))
        .await
        .unwrap();

    let key = fixture
        .service
        .verifier()
        .prove_access(&secret.commitment(), &ContentId::from("basic-post"), fixture.creator_id())
        .await
        .unwrap();
    assert_eq!(&key, fixture.content_key("basic-post"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_create_one_grant() {
    let store = SqliteStore::open_memory().unwrap();
    let fixture = TestFixture::with_store(store, ServiceConfig::default()).await;
    let secret = scenario_secret();
    let memo = fixture.supporter_memo(&secret, "basic");
    let tx = TxHash::from("tx-race");

    let processor = fixture.service.processor().clone();
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let processor = processor.clone();
        let creator = fixture.creator_id().clone();
        let memo = memo.clone();
        let tx = tx.clone();
        tasks.push(tokio::spawn(async move {
            processor
                .process_payment(&tx, &creator, &memo, BASIC_PRICE)
                .await
                .unwrap()
        }));
    }

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap());
    }
    assert!(outcomes.windows(2).all(|w| w[0] == w[1]));

    let store = fixture.service.store();
    let record = store.get_payment(&tx).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Processed);
    assert_eq!(store.count_grants(fixture.creator_id()).await.unwrap(), 1);

    // One period, not eight.
    let grant = store
        .get_grant(&secret.commitment(), fixture.creator_id())
        .await
        .unwrap()
        .unwrap();
    assert!(grant.valid_until <= Utc::now() + chrono::Duration::days(31));
}

#[tokio::test]
async fn revoked_grant_is_denied_and_renewal_restarts() {
    let fixture = TestFixture::new().await;
    let secret = scenario_secret();
    let memo = fixture.supporter_memo(&secret, "basic");
    let processor = fixture.service.processor();
    processor
        .process_payment(&TxHash::from("tx1"), fixture.creator_id(), &memo, BASIC_PRICE)
        .await
        .unwrap();

    assert!(fixture
        .service
        .revoke_grant(&secret.commitment(), fixture.creator_id())
        .await
        .unwrap());
    assert_eq!(
        fixture
            .service
            .verifier()
            .prove_access(&secret.commitment(), &ContentId::from("welcome"), fixture.creator_id())
            .await,
        Err(AccessDenied)
    );

    processor
        .process_payment(&TxHash::from("tx2"), fixture.creator_id(), &memo, BASIC_PRICE)
        .await
        .unwrap();
    let grant = fixture
        .service
        .verifier()
        .verify_access(&secret.commitment(), fixture.creator_id())
        .await
        .unwrap();
    assert!(!grant.revoked);
}

#[tokio::test]
async fn grants_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("veil.db");
    let secret = scenario_secret();
    let tx = TxHash::from("tx-persist");

    let fixture = TestFixture::with_store(SqliteStore::open(&path).unwrap(), ServiceConfig::default()).await;
    let memo = fixture.supporter_memo(&secret, "basic");
    let first = fixture
        .service
        .processor()
        .process_payment(&tx, fixture.creator_id(), &memo, BASIC_PRICE)
        .await
        .unwrap();
    let creator_id = fixture.creator_id().clone();
    drop(fixture);

    let store = SqliteStore::open(&path).unwrap();
    let record = store.get_payment(&tx).await.unwrap().unwrap();
    assert_eq!(record.outcome, Some(first));
    let grant = store.get_grant(&secret.commitment(), &creator_id).await.unwrap().unwrap();
    assert!(grant.is_valid(Utc::now()));
}

#[tokio::test]
async fn monitor_delivers_confirmed_payments_to_processor() {
    init_tracing();
    let fixture = TestFixture::with_config(ServiceConfig {
        monitor: MonitorConfig {
            poll_interval: Duration::from_millis(10),
            min_confirmations: 2,
            fetch_timeout: Duration::from_secs(1),
        },
        ..ServiceConfig::default()
    })
    .await;
    let paid = scenario_secret();
    let cheap = Secret::from_bytes([0x11; 32]);
    fixture.send_payment("tx-paid", BASIC_PRICE, fixture.supporter_memo(&paid, "basic"), 1);
    fixture.send_payment("tx-cheap", Zatoshis::new(1), fixture.supporter_memo(&cheap, "basic"), 6);
    fixture.send_payment("tx-junk", BASIC_PRICE, b"hello".to_vec(), 6);
    fixture.chain.fail_next_calls(1).unwrap();

    let handle = fixture
        .service
        .watch(fixture.creator_id(), fixture.chain.clone(), Arc::new(PlaintextMemoDecryptor))
        .await
        .unwrap();

    let store = fixture.service.store();
    let running = &handle;
    wait_for(move || async move { running.stats().emitted == 2 }).await;

    // Below the confirmation threshold: not yet processed.
    assert!(store.get_payment(&TxHash::from("tx-paid")).await.unwrap().is_none());
    fixture.chain.set_confirmations(&TxHash::from("tx-paid"), 2).unwrap();
    wait_for(move || async move { running.stats().emitted == 3 }).await;

    let stats = handle.stats();
    handle.stop().await;
    assert_eq!(stats.emitted, 3);
    assert_eq!(stats.fetch_errors, 1);

    let verifier = fixture.service.verifier();
    assert!(verifier.verify_access(&paid.commitment(), fixture.creator_id()).await.is_ok());
    assert_eq!(
        verifier.verify_access(&cheap.commitment(), fixture.creator_id()).await,
        Err(AccessDenied)
    );
    let junk = store.get_payment(&TxHash::from("tx-junk")).await.unwrap().unwrap();
    assert!(matches!(
        junk.outcome,
        Some(PaymentOutcome::Rejected(RejectReason::InvalidMemo(_)))
    ));
}

#[tokio::test]
async fn payment_split_across_outputs_is_summed() {
    let fixture = TestFixture::with_config(ServiceConfig {
        monitor: MonitorConfig {
            poll_interval: Duration::from_millis(10),
            min_confirmations: 1,
            fetch_timeout: Duration::from_secs(1),
        },
        ..ServiceConfig::default()
    })
    .await;
    let secret = scenario_secret();
    fixture.send_payment("tx-split", Zatoshis::new(6_000_000), fixture.supporter_memo(&secret, "basic"), 3);
    fixture.send_payment("tx-split", Zatoshis::new(4_000_000), Vec::new(), 3);

    let handle = fixture
        .service
        .watch(fixture.creator_id(), fixture.chain.clone(), Arc::new(PlaintextMemoDecryptor))
        .await
        .unwrap();
    let running = &handle;
    wait_for(move || async move { running.stats().emitted == 1 }).await;
    handle.stop().await;

    let record = fixture
        .service
        .store()
        .get_payment(&TxHash::from("tx-split"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.amount, BASIC_PRICE);
    assert!(matches!(record.outcome, Some(PaymentOutcome::Granted(_))));
}

async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
