//! In-memory projections materialised from verified blocks. These are the
//! shapes accessors hand back to callers and cache; `db.rs` knows how to
//! persist/reload the subset that must survive a process restart (the
//! local user's own identity and already-resolved resource keys).

use tc_crypto::keys::{PublicEncryptionKey, PublicSignatureKey};
use tc_crypto::{EncryptionKeyPair, SigningKeyPair, SymmetricKey};
use tc_proto::{DeviceId, GroupId, ResourceId, UserId};

/// A single user-encryption-keypair entry in a user's chronological key
/// history. Only the local user's own entries carry a private half.
#[derive(Debug, Clone)]
pub struct UserKeyPairEntry {
    pub public_encryption_key: PublicEncryptionKey,
    pub private_encryption_key: Option<[u8; 32]>,
}

/// This device's private identity. Exists only between `start` and `stop`.
pub struct LocalUser {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub signature_keypair: SigningKeyPair,
    pub encryption_keypair: EncryptionKeyPair,
    /// Oldest-to-newest; `last()` is current.
    pub user_keys: Vec<UserKeyPairEntry>,
}

impl LocalUser {
    pub fn current_user_key(&self) -> Option<&UserKeyPairEntry> {
        self.user_keys.last()
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub is_ghost_device: bool,
    pub revoked_at_index: Option<u64>,
}

impl Device {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at_index.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub current_public_user_encryption_key: Option<PublicEncryptionKey>,
    pub device_ids: Vec<DeviceId>,
}

/// A group's private key material, known only when the group is internal.
#[derive(Debug, Clone)]
pub struct GroupPrivateKeys {
    pub signature_keypair_secret: [u8; 32],
    pub encryption_keypair_secret: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct Group {
    pub group_id: GroupId,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub last_block_hash: tc_crypto::keys::Hash,
    pub last_key_rotation_block_hash: tc_crypto::keys::Hash,
    /// `Some` only when this process holds the group's private keys.
    pub private_keys: Option<GroupPrivateKeys>,
    /// Recoverable by any member via their own seal-decrypt; kept even
    /// for internal groups since it is how a *new* member recovers them.
    pub sealed_private_signature_key: Vec<u8>,
}

impl Group {
    pub fn is_internal(&self) -> bool {
        self.private_keys.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionalUserKeys {
    pub app_encryption_public_key: PublicEncryptionKey,
    pub app_encryption_private_key: Option<[u8; 32]>,
    pub tanker_encryption_public_key: PublicEncryptionKey,
    pub tanker_encryption_private_key: Option<[u8; 32]>,
}

#[derive(Debug, Clone)]
pub struct ResourceKeyEntry {
    pub resource_id: ResourceId,
    pub key: SymmetricKeyBytes,
}

/// `SymmetricKey` does not implement `Clone` (it zeroizes on drop and we
/// want every clone to be an intentional, explicit copy); projections
/// store the raw bytes and rehydrate a `SymmetricKey` on use.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricKeyBytes(pub [u8; 32]);

impl SymmetricKeyBytes {
    pub fn to_key(self) -> SymmetricKey {
        SymmetricKey::from_bytes(self.0)
    }
}
