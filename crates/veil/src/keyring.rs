//! The deployment's key ring.
//!
//! Wraps the system key and walks the key hierarchy for stored records:
//! system key → creator master key → content key. Plaintext master keys
//! exist only inside these calls.

use veil_core::{ContentId, CreatorId};
use veil_perms::{ContentKey, MasterKey, Result, SealedKey, SystemKey};
use veil_store::{ContentRecord, CreatorRecord};

/// Sealed key material for a new creator.
pub struct CreatorKeys {
    pub sealed_master_key: SealedKey,
    pub sealed_viewing_key: Option<SealedKey>,
}

#[derive(Clone, Debug)]
pub struct KeyRing {
    system: SystemKey,
}

impl KeyRing {
    pub fn new(system: SystemKey) -> Self {
        Self { system }
    }

    /// Generate a master key for `creator_id` and seal it, along with the
    /// chain viewing key if there is one.
    pub fn create_creator_keys(
        &self,
        creator_id: &CreatorId,
        viewing_key: Option<&str>,
    ) -> Result<CreatorKeys> {
        let master = MasterKey::generate();
        let sealed_master_key = self.system.seal_master_key(&master, creator_id)?;
        let sealed_viewing_key = viewing_key
            .map(|vk| self.system.seal_viewing_key(vk, creator_id))
            .transpose()?;
        Ok(CreatorKeys {
            sealed_master_key,
            sealed_viewing_key,
        })
    }

    /// Generate a content key and seal it under the creator's master key.
    pub fn create_content_key(
        &self,
        creator: &CreatorRecord,
        content_id: &ContentId,
    ) -> Result<(ContentKey, SealedKey)> {
        let master = self.master_key(creator)?;
        let key = ContentKey::generate();
        let sealed = master.seal_content_key(&key, content_id)?;
        Ok((key, sealed))
    }

    /// Unwrap a content key. Fails closed on any authentication failure.
    pub fn open_content_key(
        &self,
        creator: &CreatorRecord,
        content: &ContentRecord,
    ) -> Result<ContentKey> {
        let master = self.master_key(creator)?;
        master.open_content_key(&content.sealed_key, &content.id)
    }

    /// Recover the creator's chain viewing key, if one was stored.
    pub fn open_viewing_key(&self, creator: &CreatorRecord) -> Result<Option<String>> {
        creator
            .sealed_viewing_key
            .as_ref()
            .map(|sealed| self.system.open_viewing_key(sealed, &creator.id))
            .transpose()
    }

    fn master_key(&self, creator: &CreatorRecord) -> Result<MasterKey> {
        self.system
            .open_master_key(&creator.sealed_master_key, &creator.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use veil_core::ShieldedAddress;
    use veil_perms::{EncryptionKey, PermsError};
    use veil_store::{StoragePointer, StorageProvider};

    fn creator(ring: &KeyRing, id: &str) -> CreatorRecord {
        let id = CreatorId::from(id);
        let keys = ring.create_creator_keys(&id, Some("zxviews1abc")).unwrap();
        CreatorRecord {
            id,
            shielded_address: ShieldedAddress::from("zs1"),
            sealed_master_key: keys.sealed_master_key,
            sealed_viewing_key: keys.sealed_viewing_key,
            created_at: Utc::now(),
        }
    }

    fn content(creator: &CreatorRecord, id: &str, sealed_key: SealedKey) -> ContentRecord {
        ContentRecord {
            id: ContentId::from(id),
            creator_id: creator.id.clone(),
            tier_id: None,
            sealed_key,
            storage: StoragePointer {
                provider: StorageProvider::Ipfs,
                hash: "Qm".to_string(),
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_content_key_roundtrip_through_hierarchy() {
        let ring = KeyRing::new(SystemKey::new(EncryptionKey::generate()));
        let alice = creator(&ring, "alice");
        let (key, sealed) = ring
            .create_content_key(&alice, &ContentId::from("post"))
            .unwrap();

        let record = content(&alice, "post", sealed);
        assert_eq!(ring.open_content_key(&alice, &record).unwrap(), key);
        assert_eq!(
            ring.open_viewing_key(&alice).unwrap().as_deref(),
            Some("zxviews1abc")
        );
    }

    #[test]
    fn test_content_key_bound_to_its_creator() {
        let ring = KeyRing::new(SystemKey::new(EncryptionKey::generate()));
        let alice = creator(&ring, "alice");
        let bob = creator(&ring, "bob");
        let (_, sealed) = ring
            .create_content_key(&alice, &ContentId::from("post"))
            .unwrap();

        let record = content(&alice, "post", sealed);
        assert!(matches!(
            ring.open_content_key(&bob, &record),
            Err(PermsError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_wrong_system_key_fails_closed() {
        let ring = KeyRing::new(SystemKey::new(EncryptionKey::generate()));
        let other = KeyRing::new(SystemKey::new(EncryptionKey::generate()));
        let alice = creator(&ring, "alice");
        let (_, sealed) = ring
            .create_content_key(&alice, &ContentId::from("post"))
            .unwrap();

        assert!(other
            .open_content_key(&alice, &content(&alice, "post", sealed))
            .is_err());
    }
}
