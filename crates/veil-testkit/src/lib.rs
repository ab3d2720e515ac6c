//! # Veil Testkit
//!
//! Testing utilities for Veil.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known secrets with their expected commitments
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A service with an onboarded creator, tiers and content
//!
//! ## Golden Vectors
//!
//! ```rust
//! use veil_testkit::vectors::{all_vectors, commitment_from_vector};
//!
//! for vector in all_vectors() {
//!     let commitment = commitment_from_vector(&vector).unwrap();
//!     assert_eq!(commitment.to_hex(), vector.expected_commitment);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use veil_testkit::generators::raw_memo;
//!
//! proptest! {
//!     #[test]
//!     fn decode_is_total(bytes in raw_memo()) {
//!         let _ = veil_core::memo::decode(&bytes);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use veil_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new().await;
//! let memo = fixture.supporter_memo(&secret, "basic");
//! fixture.send_payment("tx1", veil_testkit::BASIC_PRICE, memo, 1);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{TestFixture, BASIC_PRICE, PREMIUM_PRICE};
pub use vectors::{all_vectors, commitment_from_vector, verify_all_vectors, CommitmentVector};
