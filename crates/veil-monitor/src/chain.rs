//! Chain interface abstraction.
//!
//! The monitor never talks to a node directly. It sees the chain through
//! [`ChainClient`] (addresses and already-decoded transaction metadata) and
//! [`MemoDecryptor`] (turning raw memo bytes into plaintext). Which key
//! material decryption needs is the decryptor's business.

use async_trait::async_trait;
use bytes::Bytes;

use veil_core::{ShieldedAddress, TxHash, Zatoshis};

use crate::error::Result;

/// A fresh receiving address and the key that can read its incoming notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldedAccount {
    pub address: ShieldedAddress,
    pub viewing_key: Option<String>,
}

/// One incoming payment to a watched address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTransaction {
    pub tx_hash: TxHash,
    pub amount: Zatoshis,
    /// As reported by the node; trusted without further checks.
    pub confirmations: u32,
    /// Memo field as delivered by the node, before decryption.
    pub raw_memo: Bytes,
}

/// Chain access for address creation and payment discovery.
///
/// Implementations must be thread-safe (Send + Sync). All calls are
/// network-bound and fallible.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Create a new shielded address, exporting its viewing key if possible.
    async fn new_shielded_address(&self) -> Result<ShieldedAccount>;

    /// List payments received by `address`, confirmed or not.
    ///
    /// Each transaction appears once, with the total it paid to `address`.
    async fn list_incoming_transactions(
        &self,
        address: &ShieldedAddress,
    ) -> Result<Vec<IncomingTransaction>>;
}

/// The capability to read a memo.
#[async_trait]
pub trait MemoDecryptor: Send + Sync {
    /// Decrypt `raw_memo` into plaintext memo bytes.
    async fn decrypt_memo(&self, raw_memo: &[u8]) -> Result<Vec<u8>>;
}

/// Decryptor for nodes that already return plaintext memos.
///
/// A full node holding the address's viewing key decrypts notes itself, so
/// the memo arrives readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextMemoDecryptor;

#[async_trait]
impl MemoDecryptor for PlaintextMemoDecryptor {
    async fn decrypt_memo(&self, raw_memo: &[u8]) -> Result<Vec<u8>> {
        Ok(raw_memo.to_vec())
    }
}
