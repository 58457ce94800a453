//! The read-only projection the verifier needs to check a block, supplied
//! by the caller (normally `tc-store`'s accessors) ahead of time. The
//! verifier itself never performs I/O — it only reads what is handed to it.

use tc_crypto::keys::{Hash, PublicEncryptionKey, PublicSignatureKey};
use tc_proto::{DeviceId, GroupId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub is_revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub user_id: UserId,
    pub device_ids: Vec<DeviceId>,
    /// Ordered oldest-to-newest; `last()` is the user's current public key.
    pub user_public_encryption_keys: Vec<PublicEncryptionKey>,
}

impl UserInfo {
    pub fn current_public_encryption_key(&self) -> Option<&PublicEncryptionKey> {
        self.user_public_encryption_keys.last()
    }

    pub fn has_user_key(&self) -> bool {
        !self.user_public_encryption_keys.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub group_id: GroupId,
    pub public_signature_key: PublicSignatureKey,
    pub last_block_hash: Hash,
}

/// Everything the verifier may need to resolve about prior chain state.
/// Implementations look these up from in-memory projections maintained by
/// `tc-store`; the verifier performs no I/O of its own.
pub trait VerificationContext {
    /// Resolve the public signature key that authored a block, given that
    /// block's hash (`Block::author`). Covers both the trustchain root
    /// block (the trustchain's own signature key) and device-creation
    /// blocks (the device's signature key).
    fn author_public_signature_key(&self, author: &Hash) -> Option<PublicSignatureKey>;

    /// Resolve full device info when the author is known to be a device.
    fn author_device(&self, author: &Hash) -> Option<DeviceInfo>;

    fn user(&self, user_id: &UserId) -> Option<UserInfo>;

    fn device(&self, device_id: &DeviceId) -> Option<DeviceInfo>;

    fn group(&self, group_id: &GroupId) -> Option<GroupInfo>;

    /// True if a user with this id has already claimed the chain.
    fn user_exists(&self, user_id: &UserId) -> bool {
        self.user(user_id).is_some()
    }
}
