//! Per-address transaction monitor.
//!
//! A [`TransactionMonitor`] owns everything it needs for one watched address:
//! the chain client, the memo decryptor, the sink it forwards payments to,
//! and the set of transactions it has already emitted. Nothing is global, so
//! any number of monitors can run side by side.
//!
//! ## Delivery
//!
//! A transaction is forwarded once it reaches `min_confirmations`. It is
//! marked as emitted only after the sink accepts it; a sink failure leaves
//! it eligible on the next tick. The emitted set lives only as long as the
//! monitor, so the sink must itself be idempotent on `tx_hash`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use veil_core::memo::decode;
use veil_core::{CreatorId, MemoEnvelope, MemoError, ShieldedAddress, TxHash, Zatoshis};

use crate::chain::{ChainClient, IncomingTransaction, MemoDecryptor};
use crate::error::{MonitorError, Result};

/// Monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between polls.
    pub poll_interval: Duration,
    /// Confirmations a transaction needs before it is forwarded.
    pub min_confirmations: u32,
    /// Upper bound on one `list_incoming_transactions` call.
    pub fetch_timeout: Duration,
}

impl MonitorConfig {
    /// Reject settings the poll loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(MonitorError::InvalidConfig("poll_interval must be non-zero".into()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(MonitorError::InvalidConfig("fetch_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            min_confirmations: 1,
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

/// A confirmed payment, as handed to the sink.
#[derive(Debug, Clone)]
pub struct ObservedPayment {
    pub tx_hash: TxHash,
    pub creator_id: CreatorId,
    pub amount: Zatoshis,
    pub confirmations: u32,
    /// Memo bytes after decryption.
    pub raw_memo: Bytes,
    /// Result of decoding `raw_memo`.
    pub memo: std::result::Result<MemoEnvelope, MemoError>,
}

/// Receiver of confirmed payments.
#[async_trait]
pub trait PaymentSink: Send + Sync {
    /// Handle one payment. A retryable error leaves the payment eligible for
    /// the next poll; any other error drops it for the life of the monitor.
    async fn on_payment(&self, payment: ObservedPayment) -> Result<()>;
}

/// Running counters for one monitor.
#[derive(Debug, Default)]
pub struct MonitorStats {
    polls: AtomicU64,
    emitted: AtomicU64,
    fetch_errors: AtomicU64,
    sink_errors: AtomicU64,
}

/// Point-in-time copy of [`MonitorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStatsSnapshot {
    pub polls: u64,
    pub emitted: u64,
    pub fetch_errors: u64,
    pub sink_errors: u64,
}

impl MonitorStats {
    pub fn snapshot(&self) -> MonitorStatsSnapshot {
        MonitorStatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

/// Watches one shielded address.
pub struct TransactionMonitor {
    creator_id: CreatorId,
    address: ShieldedAddress,
    chain: Arc<dyn ChainClient>,
    decryptor: Arc<dyn MemoDecryptor>,
    sink: Arc<dyn PaymentSink>,
    config: MonitorConfig,
    seen: HashSet<TxHash>,
    stats: Arc<MonitorStats>,
}

impl TransactionMonitor {
    /// Build a monitor. Fails if `config` does not validate.
    pub fn new(
        creator_id: CreatorId,
        address: ShieldedAddress,
        chain: Arc<dyn ChainClient>,
        decryptor: Arc<dyn MemoDecryptor>,
        sink: Arc<dyn PaymentSink>,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            creator_id,
            address,
            chain,
            decryptor,
            sink,
            config,
            seen: HashSet::new(),
            stats: Arc::new(MonitorStats::default()),
        })
    }

    pub fn address(&self) -> &ShieldedAddress {
        &self.address
    }

    pub fn stats(&self) -> MonitorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether `tx_hash` has been delivered by this monitor.
    pub fn has_emitted(&self, tx_hash: &TxHash) -> bool {
        self.seen.contains(tx_hash)
    }

    /// Run a single poll. Returns how many payments the sink accepted.
    ///
    /// Fails only if the transaction list could not be fetched. Retryable
    /// per-payment failures are logged and retried on a later poll.
    pub async fn poll_once(&mut self) -> Result<usize> {
        self.stats.polls.fetch_add(1, Ordering::Relaxed);

        let fetch = self.chain.list_incoming_transactions(&self.address);
        let txs = match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(Ok(txs)) => txs,
            Ok(Err(e)) => {
                self.stats.fetch_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
            Err(_) => {
                self.stats.fetch_errors.fetch_add(1, Ordering::Relaxed);
                return Err(MonitorError::Timeout(self.config.fetch_timeout));
            }
        };

        let mut emitted = 0;
        for tx in txs {
            if tx.confirmations < self.config.min_confirmations || self.seen.contains(&tx.tx_hash)
            {
                continue;
            }

            let Some(payment) = self.observe(tx).await else {
                continue;
            };
            let tx_hash = payment.tx_hash.clone();

            match self.sink.on_payment(payment).await {
                Ok(()) => {
                    debug!(tx = %tx_hash, creator = %self.creator_id, "payment emitted");
                    self.seen.insert(tx_hash);
                    self.stats.emitted.fetch_add(1, Ordering::Relaxed);
                    emitted += 1;
                }
                Err(e) if e.is_retryable() => {
                    self.stats.sink_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(tx = %tx_hash, error = %e, "payment sink failed, will retry");
                }
                Err(e) => {
                    self.stats.sink_errors.fetch_add(1, Ordering::Relaxed);
                    error!(
                        tx = %tx_hash,
                        creator = %self.creator_id,
                        error = %e,
                        "payment sink refused payment, dropping it"
                    );
                    self.seen.insert(tx_hash);
                }
            }
        }
        Ok(emitted)
    }

    /// Decrypt and decode one transaction's memo.
    ///
    /// Returns `None` when decryption should be retried later.
    async fn observe(&self, tx: IncomingTransaction) -> Option<ObservedPayment> {
        let raw_memo = match self.decryptor.decrypt_memo(&tx.raw_memo).await {
            Ok(plain) => Bytes::from(plain),
            Err(e) if e.is_retryable() => {
                warn!(tx = %tx.tx_hash, error = %e, "memo decryption deferred");
                return None;
            }
            Err(e) => {
                debug!(tx = %tx.tx_hash, error = %e, "memo not decryptable, decoding raw bytes");
                tx.raw_memo.clone()
            }
        };
        let memo = decode(&raw_memo);

        Some(ObservedPayment {
            tx_hash: tx.tx_hash,
            creator_id: self.creator_id.clone(),
            amount: tx.amount,
            confirmations: tx.confirmations,
            raw_memo,
            memo,
        })
    }

    /// Start polling on a background task.
    pub fn spawn(mut self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                creator = %self.creator_id,
                address = %self.address,
                interval = ?self.config.poll_interval,
                "transaction monitor started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        if let Err(e) = self.poll_once().await {
                            warn!(
                                creator = %self.creator_id,
                                error = %e,
                                retryable = e.is_retryable(),
                                "poll failed"
                            );
                        }
                    }
                }
            }
            info!(creator = %self.creator_id, "transaction monitor stopped");
        });

        MonitorHandle {
            shutdown: shutdown_tx,
            task: Some(task),
            stats,
        }
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle signals shutdown without waiting for it.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    stats: Arc<MonitorStats>,
}

impl MonitorHandle {
    /// Stop polling and wait for the task to exit.
    ///
    /// A poll already in progress finishes first; no payment is delivered
    /// after this returns.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "monitor task ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> MonitorStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
