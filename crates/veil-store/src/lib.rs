//! # Veil Store
//!
//! Storage abstraction for Veil. Provides a trait-based interface for the
//! payment ledger, grants, creators, tiers and content, with SQLite and
//! in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`PaymentRecord`] - The idempotency ledger entry for one transaction
//! - [`Resolution`] - The processor's verdict on a claimed payment
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veil_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("veil.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod records;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::{
    ClaimResult, ContentRecord, CreatorRecord, PaymentOutcome, PaymentRecord, PaymentStatus,
    RejectReason, Resolution, StoragePointer, StorageProvider,
};
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};
