//! A simple in-memory chain for testing.
//!
//! Holds per-address transaction lists owned by the instance, so several
//! chains (and monitors) can run side by side in one test.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use veil_core::{ShieldedAddress, TxHash, Zatoshis};

use crate::chain::{ChainClient, IncomingTransaction, ShieldedAccount};
use crate::error::{MonitorError, Result};

#[derive(Default)]
struct MemoryChainInner {
    next_address: u64,
    transactions: HashMap<ShieldedAddress, Vec<IncomingTransaction>>,
    /// Number of upcoming list calls that fail with a connection error.
    pending_failures: u32,
    list_calls: u64,
}

/// In-memory chain implementation.
#[derive(Default)]
pub struct MemoryChain {
    inner: Mutex<MemoryChainInner>,
}

impl MemoryChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryChainInner>> {
        self.inner
            .lock()
            .map_err(|e| MonitorError::Connection(format!("memory chain poisoned: {}", e)))
    }

    /// Deliver a payment to `address`.
    ///
    /// Adding the same `tx_hash` again adds another output to that
    /// transaction: amounts are summed and the first non-empty memo is kept.
    pub fn add_transaction(
        &self,
        address: &ShieldedAddress,
        tx_hash: impl Into<TxHash>,
        amount: Zatoshis,
        confirmations: u32,
        memo: impl Into<Bytes>,
    ) -> Result<()> {
        let tx_hash = tx_hash.into();
        let memo = memo.into();
        let mut inner = self.lock()?;
        let txs = inner.transactions.entry(address.clone()).or_default();

        if let Some(tx) = txs.iter_mut().find(|tx| tx.tx_hash == tx_hash) {
            tx.amount = tx.amount.checked_add(amount).ok_or_else(|| {
                MonitorError::InvalidResponse(format!("amount overflow in {}", tx_hash))
            })?;
            if tx.raw_memo.is_empty() {
                tx.raw_memo = memo;
            }
            return Ok(());
        }

        txs.push(IncomingTransaction {
            tx_hash,
            amount,
            confirmations,
            raw_memo: memo,
        });
        Ok(())
    }

    /// Set the confirmation count of `tx_hash`.
    pub fn set_confirmations(&self, tx_hash: &TxHash, confirmations: u32) -> Result<()> {
        let mut inner = self.lock()?;
        for tx in inner.transactions.values_mut().flatten() {
            if &tx.tx_hash == tx_hash {
                tx.confirmations = confirmations;
            }
        }
        Ok(())
    }

    /// Make the next `count` list calls fail with a connection error.
    pub fn fail_next_calls(&self, count: u32) -> Result<()> {
        self.lock()?.pending_failures = count;
        Ok(())
    }

    /// Number of list calls served so far, failed ones included.
    pub fn list_calls(&self) -> u64 {
        self.lock().map(|inner| inner.list_calls).unwrap_or(0)
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn new_shielded_address(&self) -> Result<ShieldedAccount> {
        let mut inner = self.lock()?;
        inner.next_address += 1;
        let n = inner.next_address;
        Ok(ShieldedAccount {
            address: ShieldedAddress::from(format!("zs1memory{:04}", n)),
            viewing_key: Some(format!("zxviewsmemory{:04}", n)),
        })
    }

    async fn list_incoming_transactions(
        &self,
        address: &ShieldedAddress,
    ) -> Result<Vec<IncomingTransaction>> {
        let mut inner = self.lock()?;
        inner.list_calls += 1;
        if inner.pending_failures > 0 {
            inner.pending_failures -= 1;
            return Err(MonitorError::Connection("injected failure".into()));
        }
        Ok(inner.transactions.get(address).cloned().unwrap_or_default())
    }
}
