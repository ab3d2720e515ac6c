//! # Veil Permissions
//!
//! Key wrapping, access grants and tier policy.
//!
//! ## Encryption Model
//!
//! Keys form a two-level hierarchy:
//!
//! 1. **Master Key**: one per creator, sealed under the deployment's system key
//! 2. **Content Key**: one per content item, sealed under its creator's master key
//!
//! Every sealed key is a [`SealedKey`] (ChaCha20-Poly1305, detached tag) that
//! is stored and loaded as one unit.
//!
//! ## Grants
//!
//! An [`AccessGrant`] records that a commitment may read a creator's tier
//! until a deadline. [`TierAccessPolicy`] decides which content tiers a
//! grant's tier unlocks.

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod grant;
pub mod keys;
pub mod policy;

pub use crypto::{AuthTag, EncryptionKey, EncryptionNonce};
pub use envelope::{EncryptionFormat, SealedKey};
pub use error::{PermsError, Result};
pub use grant::{AccessGrant, SubscriptionPeriod};
pub use keys::{ContentKey, MasterKey, SystemKey};
pub use policy::{Tier, TierAccessPolicy};
