//! Golden commitment vectors.
//!
//! A commitment is SHA-256 over the secret's 64-char lowercase hex string.
//! Any client that derives commitments must reproduce these values.

use veil_core::{Commitment, Secret};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct CommitmentVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Secret as 64 hex characters.
    pub secret_hex: &'static str,
    /// Expected commitment (hex).
    pub expected_commitment: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<CommitmentVector> {
    vec![
        CommitmentVector {
            name: "all zero secret",
            secret_hex: "0000000000000000000000000000000000000000000000000000000000000000",
            expected_commitment: "60e05bd1b195af2f94112fa7197a5c88289058840ce7c6df9693756bc6250f55",
        },
        CommitmentVector {
            name: "repeated 0x42",
            secret_hex: "4242424242424242424242424242424242424242424242424242424242424242",
            expected_commitment: "2d23b34a69ee132da2f1ade478741b06190067c4e249a71e7a2fe79ef959309e",
        },
        CommitmentVector {
            name: "all ones secret",
            secret_hex: "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            expected_commitment: "df0790f236013511e91fa4532fb7761f62320a51a3868dabf4a13fe5f53e3263",
        },
        CommitmentVector {
            name: "counting nibbles",
            secret_hex: "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            expected_commitment: "a8ae6e6ee929abea3afcfc5258c8ccd6f85273e0d4626d26c7279f3250f77c8e",
        },
    ]
}

/// Compute the commitment for a vector.
pub fn commitment_from_vector(vector: &CommitmentVector) -> Result<Commitment, String> {
    let secret = Secret::from_hex(vector.secret_hex)
        .map_err(|e| format!("{}: bad secret: {}", vector.name, e))?;
    Ok(secret.commitment())
}

/// Verify all golden vectors, reporting the first mismatch.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let actual = commitment_from_vector(&vector)?.to_hex();
        if actual != vector.expected_commitment {
            return Err(format!(
                "{}: expected {}, got {}",
                vector.name, vector.expected_commitment, actual
            ));
        }
    }
    Ok(())
}
