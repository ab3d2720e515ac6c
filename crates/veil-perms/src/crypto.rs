//! Cryptographic utilities for the permissions module.
//!
//! ChaCha20-Poly1305 with the tag kept detached from the ciphertext, so the
//! envelope can store nonce, ciphertext and tag as distinct fields of one
//! record.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PermsError, Result};

/// A 256-bit symmetric encryption key for ChaCha20-Poly1305.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PermsError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Parse from 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| PermsError::InvalidKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Encrypt `plaintext`, binding `aad`. Returns the ciphertext and its tag.
    pub fn encrypt_detached(
        &self,
        plaintext: &[u8],
        nonce: &EncryptionNonce,
        aad: &[u8],
    ) -> Result<(Vec<u8>, AuthTag)> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce.0), aad, &mut buffer)
            .map_err(|e| PermsError::Encryption(e.to_string()))?;
        Ok((buffer, AuthTag::from_tag(&tag)))
    }

    /// Verify `tag` over `ciphertext` and `aad`, then decrypt.
    ///
    /// No plaintext is produced unless the tag verifies.
    pub fn decrypt_detached(
        &self,
        ciphertext: &[u8],
        nonce: &EncryptionNonce,
        tag: &AuthTag,
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce.0),
                aad,
                &mut buffer,
                Tag::from_slice(&tag.0),
            )
            .map_err(|_| PermsError::AuthenticationFailed)?;
        Ok(buffer)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 12];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// A 128-bit Poly1305 authentication tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTag(pub [u8; 16]);

impl AuthTag {
    fn from_tag(tag: &Tag) -> Self {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(tag.as_slice());
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}
