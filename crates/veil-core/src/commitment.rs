//! Commitment engine.
//!
//! A supporter draws a random [`Secret`], publishes only its [`Commitment`]
//! in the payment memo, and later proves entitlement by presenting the
//! commitment (or the secret, for [`verify`]).
//!
//! `commitment = SHA-256(lowercase_hex(secret))`. The hex string is the
//! secret's canonical encoding, so clients in any language derive the same
//! commitment from the same 64-character string.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::error::CommitmentError;

/// A 256-bit client-held secret.
///
/// Never persisted server-side. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; 32]);

impl Secret {
    /// Draw a fresh secret from the operating system's CSPRNG.
    ///
    /// # Panics
    ///
    /// Panics if the OS entropy source fails. There is no safe fallback.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical encoding: 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, CommitmentError> {
        decode_32(s).map(Self)
    }

    /// Compute this secret's commitment.
    pub fn commitment(&self) -> Commitment {
        commit(self)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// A SHA-256 commitment to a [`Secret`].
///
/// Serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Commitment([u8; 32]);

impl Commitment {
    /// Create from raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to a 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from exactly 64 hex characters (either case).
    pub fn from_hex(s: &str) -> Result<Self, CommitmentError> {
        decode_32(s).map(Self)
    }
}

fn decode_32(s: &str) -> Result<[u8; 32], CommitmentError> {
    if s.len() != 64 {
        return Err(CommitmentError::InvalidLength(s.len()));
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out).map_err(|_| CommitmentError::InvalidHex)?;
    Ok(out)
}

/// Commit to a secret. Deterministic and pure.
pub fn commit(secret: &Secret) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update(secret.to_hex().as_bytes());
    Commitment(hasher.finalize().into())
}

/// Check that `secret` opens `commitment`, comparing in constant time.
pub fn verify(secret: &Secret, commitment: &Commitment) -> bool {
    let computed = commit(secret);
    computed.0.as_slice().ct_eq(commitment.0.as_slice()).into()
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl FromStr for Commitment {
    type Err = CommitmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}
