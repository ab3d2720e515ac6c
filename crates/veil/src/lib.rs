//! # Veil
//!
//! Anonymous, payment-gated access to creator content over shielded
//! payments.
//!
//! ## Overview
//!
//! A supporter picks a random secret, pays a creator's shielded address and
//! puts the secret's hash commitment in the payment memo. Once the payment
//! is confirmed, the commitment holds an access grant; presenting it later
//! releases content keys. Nothing links the supporter's identity to the
//! grant.
//!
//! - **Commitments**: SHA-256 of a client-held secret
//! - **Memos**: versioned JSON payloads of at most 512 bytes
//! - **Key hierarchy**: system key → creator master key → content key
//! - **Monitoring**: per-address polling with at-least-once delivery
//! - **Processing**: idempotent on the transaction hash
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use veil::{ServiceConfig, VeilService};
//! use veil::core::CreatorId;
//! use veil::monitor::{MemoryChain, PlaintextMemoDecryptor};
//! use veil::perms::{EncryptionKey, SystemKey};
//! use veil::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("veil.db").unwrap();
//!     let service = VeilService::new(
//!         store,
//!         SystemKey::new(EncryptionKey::generate()),
//!         ServiceConfig::default(),
//!     );
//!
//!     let chain = Arc::new(MemoryChain::new());
//!     let alice = CreatorId::from("alice");
//!     service.onboard_creator(alice.clone(), chain.as_ref()).await.unwrap();
//!
//!     let handle = service
//!         .watch(&alice, chain, Arc::new(PlaintextMemoDecryptor))
//!         .await
//!         .unwrap();
//!     handle.stop().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `veil::core` - Commitments, memo codec, identifiers, amounts
//! - `veil::perms` - Key wrapping, grants, tier policy
//! - `veil::store` - Storage abstraction and SQLite
//! - `veil::monitor` - Chain interface and transaction monitor

pub mod config;
pub mod error;
pub mod keyring;
pub mod processor;
pub mod service;
pub mod verifier;

// Re-export component crates
pub use veil_core as core;
pub use veil_monitor as monitor;
pub use veil_perms as perms;
pub use veil_store as store;

// Re-export main types for convenience
pub use config::VeilConfig;
pub use error::{AccessDenied, Result, VeilError};
pub use keyring::{CreatorKeys, KeyRing};
pub use processor::{PaymentIntent, PaymentProcessor, ProcessorConfig};
pub use service::{ServiceConfig, VeilService};
pub use verifier::{AccessReport, AccessVerifier};

// Re-export commonly used core types
pub use veil_core::{Commitment, ContentId, CreatorId, MemoEnvelope, Secret, TierId, TxHash, Zatoshis};
pub use veil_store::PaymentOutcome;
