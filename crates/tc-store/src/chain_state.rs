//! The in-memory, verified projection of everything the accessors have
//! observed so far: devices, users, and the author-resolution index the
//! verifier needs. Blocks are applied here only after `verify_block`
//! accepts them, and only in ascending index order — the state never
//! regresses.

use std::collections::HashMap;

use tc_crypto::keys::{Hash, PublicSignatureKey};
use tc_proto::block::Action;
use tc_proto::{Block, DeviceId, GroupId, UserId};
use tc_verifier::{DeviceInfo, GroupInfo, UserInfo, VerificationContext};

use crate::models::{Device, User};

#[derive(Default)]
pub struct ChainState {
    pub devices: HashMap<[u8; 32], Device>,
    pub users: HashMap<[u8; 32], User>,
    /// Maps a block's own hash to the signature key that would authorize
    /// blocks it in turn authors (trustchain root, or a device).
    pub block_signature_keys: HashMap<[u8; 32], PublicSignatureKey>,
    pub trustchain_root_hash: Option<Hash>,
    pub highest_applied_index: Option<u64>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an already-verified block, updating every projection it
    /// touches. Blocks must be applied in ascending `index` order; a
    /// block at or below `highest_applied_index` is ignored.
    pub fn apply_block(&mut self, block: &Block) {
        if let Some(highest) = self.highest_applied_index {
            if block.index <= highest {
                return;
            }
        }

        match &block.action {
            Action::TrustchainCreation(action) => {
                self.trustchain_root_hash = Some(block.hash());
                self.block_signature_keys.insert(*block.hash().as_bytes(), action.public_signature_key);
            }
            Action::DeviceCreation(action) => {
                let device_id = DeviceId::from_bytes(*block.hash().as_bytes());
                let device = Device {
                    device_id,
                    user_id: action.user_id,
                    public_signature_key: action.public_signature_key,
                    public_encryption_key: action.public_encryption_key,
                    is_ghost_device: action.user_key.as_ref().map(|k| k.is_ghost_device).unwrap_or(false),
                    revoked_at_index: None,
                };
                self.block_signature_keys.insert(*device_id.as_bytes(), action.public_signature_key);

                let user = self.users.entry(*action.user_id.as_bytes()).or_insert_with(|| User {
                    user_id: action.user_id,
                    current_public_user_encryption_key: None,
                    device_ids: Vec::new(),
                });
                user.device_ids.push(device_id);
                if let Some(user_key) = &action.user_key {
                    user.current_public_user_encryption_key = Some(user_key.public_user_encryption_key);
                }

                self.devices.insert(*device_id.as_bytes(), device);
            }
            Action::DeviceRevocation(action) => {
                if let Some(device) = self.devices.get_mut(action.target_device_id.as_bytes()) {
                    device.revoked_at_index = Some(block.index);
                    let user_id = device.user_id;
                    if let Some(rotation) = &action.user_key_rotation {
                        if let Some(user) = self.users.get_mut(user_id.as_bytes()) {
                            user.current_public_user_encryption_key = Some(rotation.new_public_encryption_key);
                        }
                    }
                }
            }
            // Group and key-publish/claim blocks don't change device/user
            // projections; `tc-groups`/`tc-share` own their own caches via
            // the local store directly.
            _ => {}
        }

        self.highest_applied_index = Some(self.highest_applied_index.map_or(block.index, |h| h.max(block.index)));
    }
}

impl VerificationContext for ChainState {
    fn author_public_signature_key(&self, author: &Hash) -> Option<PublicSignatureKey> {
        self.block_signature_keys.get(author.as_bytes()).copied()
    }

    fn author_device(&self, author: &Hash) -> Option<DeviceInfo> {
        self.devices.get(author.as_bytes()).map(|d| DeviceInfo {
            device_id: d.device_id,
            user_id: d.user_id,
            public_signature_key: d.public_signature_key,
            public_encryption_key: d.public_encryption_key,
            is_revoked: d.is_revoked(),
        })
    }

    fn user(&self, user_id: &UserId) -> Option<UserInfo> {
        self.users.get(user_id.as_bytes()).map(|u| UserInfo {
            user_id: u.user_id,
            device_ids: u.device_ids.clone(),
            user_public_encryption_keys: u.current_public_user_encryption_key.into_iter().collect(),
        })
    }

    fn device(&self, device_id: &DeviceId) -> Option<DeviceInfo> {
        self.devices.get(device_id.as_bytes()).map(|d| DeviceInfo {
            device_id: d.device_id,
            user_id: d.user_id,
            public_signature_key: d.public_signature_key,
            public_encryption_key: d.public_encryption_key,
            is_revoked: d.is_revoked(),
        })
    }

    fn group(&self, _group_id: &GroupId) -> Option<GroupInfo> {
        // Group projections live in the local store (`tc-groups` reads
        // them directly); `GroupAccessor` bridges the two when verifying
        // group blocks.
        None
    }
}
