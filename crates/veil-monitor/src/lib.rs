//! # Veil Monitor
//!
//! Watches shielded addresses for incoming payments and forwards each
//! confirmed transaction, with its decoded memo, to a [`PaymentSink`].
//!
//! The chain is reached only through [`ChainClient`] and [`MemoDecryptor`],
//! so tests run against [`MemoryChain`] and production against
//! [`ZcashRpcClient`].
//!
//! ## Key Types
//!
//! - [`TransactionMonitor`] - polling loop for one address
//! - [`MonitorHandle`] - stops a spawned monitor
//! - [`ObservedPayment`] - what the sink receives

pub mod chain;
pub mod error;
pub mod memory;
pub mod monitor;
pub mod rpc;

pub use chain::{
    ChainClient, IncomingTransaction, MemoDecryptor, PlaintextMemoDecryptor, ShieldedAccount,
};
pub use error::{MonitorError, Result};
pub use memory::MemoryChain;
pub use monitor::{
    MonitorConfig, MonitorHandle, MonitorStats, MonitorStatsSnapshot, ObservedPayment,
    PaymentSink, TransactionMonitor,
};
pub use rpc::{parse_received, ReceivedNote, RpcConfig, ZcashRpcClient};
