//! Sealed key envelope.
//!
//! A wrapped key is always stored as one [`SealedKey`]: format, nonce,
//! ciphertext and tag together. There is no API that yields a ciphertext
//! without its tag, or decrypts one without it.

use serde::{Deserialize, Serialize};

use crate::crypto::{AuthTag, EncryptionKey, EncryptionNonce};
use crate::error::{PermsError, Result};

/// Format identifier for sealed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key, 96-bit nonce, 128-bit tag.
    ChaCha20Poly1305 = 1,
}

/// Key material encrypted under a wrapping key.
///
/// The `context` passed to [`seal`](Self::seal) and [`open`](Self::open) is
/// authenticated but not stored, so an envelope copied onto another record
/// fails to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// Encryption algorithm used.
    pub format: EncryptionFormat,

    /// Fresh per seal; never reused under the same wrapping key.
    pub nonce: EncryptionNonce,

    /// The encrypted key material.
    pub ciphertext: Vec<u8>,

    /// Authentication tag over ciphertext and context.
    pub tag: AuthTag,
}

impl SealedKey {
    /// Encrypt `plaintext` under `wrapping`, bound to `context`.
    pub fn seal(plaintext: &[u8], wrapping: &EncryptionKey, context: &[u8]) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let (ciphertext, tag) = wrapping.encrypt_detached(plaintext, &nonce, context)?;

        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
            tag,
        })
    }

    /// Verify and decrypt with `wrapping`. Fails closed on any mismatch.
    pub fn open(&self, wrapping: &EncryptionKey, context: &[u8]) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => {
                wrapping.decrypt_detached(&self.ciphertext, &self.nonce, &self.tag, context)
            }
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PermsError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::Serialization(e.to_string()))
    }
}
