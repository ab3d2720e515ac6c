//! # Veil Core
//!
//! Pure primitives for Veil: commitments, the memo codec, identifiers and
//! amounts.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! stateless and safe to call from any number of tasks at once.
//!
//! ## Key Types
//!
//! - [`Secret`] / [`Commitment`] - the supporter's anonymous credential
//! - [`MemoEnvelope`] - the structured payload carried in a payment memo
//! - [`Zatoshis`] - integer payment amounts
//! - [`CreatorId`], [`TierId`], [`ContentId`], [`TxHash`] - identifiers

pub mod amount;
pub mod commitment;
pub mod error;
pub mod memo;
pub mod types;

pub use amount::{Zatoshis, ZATOSHIS_PER_ZEC};
pub use commitment::{commit, verify, Commitment, Secret};
pub use error::{CommitmentError, CoreError, MemoError};
pub use memo::{MemoEnvelope, MemoTemplate, MAX_MEMO_SIZE, MEMO_VERSION};
pub use types::{ContentId, CreatorId, ShieldedAddress, TierId, TxHash};
