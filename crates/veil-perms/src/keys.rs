//! The key hierarchy.
//!
//! ```text
//! SystemKey ──wraps──▶ MasterKey (one per creator) ──wraps──▶ ContentKey (one per item)
//!           └─wraps──▶ viewing key (one per creator)
//! ```
//!
//! Each wrap authenticates a context string naming the record it belongs to,
//! so a sealed key only opens for the creator or content it was made for.

use std::fmt;

use veil_core::{ContentId, CreatorId};

use crate::crypto::EncryptionKey;
use crate::envelope::SealedKey;
use crate::error::{PermsError, Result};

fn master_context(creator_id: &CreatorId) -> Vec<u8> {
    [b"veil/master-key/v1/".as_slice(), creator_id.as_str().as_bytes()].concat()
}

fn viewing_context(creator_id: &CreatorId) -> Vec<u8> {
    [b"veil/viewing-key/v1/".as_slice(), creator_id.as_str().as_bytes()].concat()
}

fn content_context(content_id: &ContentId) -> Vec<u8> {
    [b"veil/content-key/v1/".as_slice(), content_id.as_str().as_bytes()].concat()
}

/// The deployment-wide root key, supplied by configuration.
#[derive(Clone)]
pub struct SystemKey(EncryptionKey);

impl SystemKey {
    /// Wrap an existing key.
    pub fn new(key: EncryptionKey) -> Self {
        Self(key)
    }

    /// Parse from 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self> {
        EncryptionKey::from_hex(s).map(Self)
    }

    /// Seal a creator's master key.
    pub fn seal_master_key(&self, master: &MasterKey, creator_id: &CreatorId) -> Result<SealedKey> {
        SealedKey::seal(master.0.as_bytes(), &self.0, &master_context(creator_id))
    }

    /// Open a creator's sealed master key.
    pub fn open_master_key(&self, sealed: &SealedKey, creator_id: &CreatorId) -> Result<MasterKey> {
        let plaintext = sealed.open(&self.0, &master_context(creator_id))?;
        EncryptionKey::from_slice(&plaintext).map(MasterKey)
    }

    /// Seal a creator's chain viewing key.
    pub fn seal_viewing_key(&self, viewing_key: &str, creator_id: &CreatorId) -> Result<SealedKey> {
        SealedKey::seal(viewing_key.as_bytes(), &self.0, &viewing_context(creator_id))
    }

    /// Open a creator's sealed viewing key.
    pub fn open_viewing_key(&self, sealed: &SealedKey, creator_id: &CreatorId) -> Result<String> {
        let plaintext = sealed.open(&self.0, &viewing_context(creator_id))?;
        String::from_utf8(plaintext).map_err(|_| PermsError::InvalidKey("viewing key is not UTF-8".into()))
    }
}

impl fmt::Debug for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SystemKey(<redacted>)")
    }
}

/// A creator's master key. Persisted only as a [`SealedKey`].
#[derive(Clone)]
pub struct MasterKey(EncryptionKey);

impl MasterKey {
    /// Generate a new random master key.
    pub fn generate() -> Self {
        Self(EncryptionKey::generate())
    }

    /// Seal a content key under this master key.
    pub fn seal_content_key(&self, key: &ContentKey, content_id: &ContentId) -> Result<SealedKey> {
        SealedKey::seal(key.0.as_bytes(), &self.0, &content_context(content_id))
    }

    /// Open a content key sealed under this master key.
    pub fn open_content_key(&self, sealed: &SealedKey, content_id: &ContentId) -> Result<ContentKey> {
        let plaintext = sealed.open(&self.0, &content_context(content_id))?;
        EncryptionKey::from_slice(&plaintext).map(ContentKey)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// A content item's decryption key.
///
/// Released to authorized callers; the content ciphertext it opens lives
/// outside this system.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey(EncryptionKey);

impl ContentKey {
    /// Generate a new random content key.
    pub fn generate() -> Self {
        Self(EncryptionKey::generate())
    }

    /// Wrap an existing key.
    pub fn from_key(key: EncryptionKey) -> Self {
        Self(key)
    }

    /// The underlying symmetric key.
    pub fn key(&self) -> &EncryptionKey {
        &self.0
    }

    /// Hex form, as returned to clients.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_level_unwrap() {
        let system = SystemKey::new(EncryptionKey::generate());
        let creator = CreatorId::from("alice");
        let content = ContentId::from("post-1");

        let master = MasterKey::generate();
        let sealed_master = system.seal_master_key(&master, &creator).unwrap();

        let content_key = ContentKey::generate();
        let sealed_content = master.seal_content_key(&content_key, &content).unwrap();

        let master = system.open_master_key(&sealed_master, &creator).unwrap();
        let opened = master.open_content_key(&sealed_content, &content).unwrap();
        assert_eq!(opened, content_key);
    }

    #[test]
    fn test_sealed_master_bound_to_creator() {
        let system = SystemKey::new(EncryptionKey::generate());
        let sealed = system
            .seal_master_key(&MasterKey::generate(), &CreatorId::from("alice"))
            .unwrap();

        assert!(matches!(
            system.open_master_key(&sealed, &CreatorId::from("mallory")),
            Err(PermsError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_content_key_bound_to_content() {
        let master = MasterKey::generate();
        let sealed = master
            .seal_content_key(&ContentKey::generate(), &ContentId::from("a"))
            .unwrap();

        assert!(master.open_content_key(&sealed, &ContentId::from("b")).is_err());
        assert!(MasterKey::generate()
            .open_content_key(&sealed, &ContentId::from("a"))
            .is_err());
    }

    #[test]
    fn test_master_and_viewing_contexts_differ() {
        let system = SystemKey::new(EncryptionKey::generate());
        let creator = CreatorId::from("alice");
        let sealed_vk = system.seal_viewing_key("zxviews1abc", &creator).unwrap();

        assert_eq!(system.open_viewing_key(&sealed_vk, &creator).unwrap(), "zxviews1abc");
        assert!(system.open_master_key(&sealed_vk, &creator).is_err());
    }
}
