//! Pull-on-miss accessors: `UserAccessor`, `GroupAccessor`,
//! `ProvisionalUserAccessor`, `LocalUserAccessor`. Each wraps a shared
//! [`ChainState`] behind a `tokio::sync::Mutex` — the lock is held across
//! the network round-trip so concurrent pulls for overlapping ids
//! coalesce onto a single fetch-verify-apply pass instead of racing.

use std::sync::Arc;

use tc_crypto::keys::PublicEncryptionKey;
use tc_proto::block::Action;
use tc_proto::{Block, GroupId, Requester, TrustchainId, UserId};
use tc_verifier::verify_block;
use tokio::sync::Mutex;

use crate::chain_state::ChainState;
use crate::error::StoreError;
use crate::local_store::LocalStore;
use crate::models::{Group, ProvisionalUserKeys, User, UserKeyPairEntry};

fn apply_sorted(state: &mut ChainState, mut blocks: Vec<Block>) -> Result<(), StoreError> {
    blocks.sort_by_key(|b| b.index);
    for block in &blocks {
        verify_block(block, state)?;
        state.apply_block(block);
    }
    Ok(())
}

pub struct UserAccessor {
    trustchain_id: TrustchainId,
    state: Arc<Mutex<ChainState>>,
    requester: Arc<dyn Requester>,
}

impl UserAccessor {
    pub fn new(trustchain_id: TrustchainId, state: Arc<Mutex<ChainState>>, requester: Arc<dyn Requester>) -> Self {
        Self { trustchain_id, state, requester }
    }

    /// Returns `(found, not_found)`.
    pub async fn pull(&self, user_ids: &[UserId]) -> Result<(Vec<User>, Vec<UserId>), StoreError> {
        let mut guard = self.state.lock().await;

        let missing: Vec<UserId> = user_ids.iter().filter(|id| guard.user(id).is_none()).copied().collect();
        if !missing.is_empty() {
            let blocks = self.requester.get_user_blocks(&self.trustchain_id, &missing).await?;
            apply_sorted(&mut guard, blocks)?;
        }

        let mut found = Vec::new();
        let mut not_found = Vec::new();
        for id in user_ids {
            match guard.users.get(id.as_bytes()) {
                Some(user) => found.push(user.clone()),
                None => not_found.push(*id),
            }
        }
        Ok((found, not_found))
    }
}

pub struct GroupAccessor {
    trustchain_id: TrustchainId,
    state: Arc<Mutex<ChainState>>,
    requester: Arc<dyn Requester>,
    local_store: Arc<dyn LocalStore>,
}

impl GroupAccessor {
    pub fn new(
        trustchain_id: TrustchainId,
        state: Arc<Mutex<ChainState>>,
        requester: Arc<dyn Requester>,
        local_store: Arc<dyn LocalStore>,
    ) -> Self {
        Self { trustchain_id, state, requester, local_store }
    }

    pub async fn pull(&self, group_ids: &[GroupId]) -> Result<(Vec<Group>, Vec<GroupId>), StoreError> {
        let mut found = self.local_store.groups(group_ids).await?;
        let known: std::collections::HashSet<[u8; 32]> = found.iter().map(|g| *g.group_id.as_bytes()).collect();
        let missing: Vec<GroupId> = group_ids.iter().filter(|id| !known.contains(id.as_bytes())).copied().collect();

        if !missing.is_empty() {
            let blocks = self.requester.get_group_blocks(&self.trustchain_id, &missing).await?;
            let mut sorted = blocks;
            sorted.sort_by_key(|b| b.index);
            let mut guard = self.state.lock().await;
            for block in &sorted {
                match &block.action {
                    Action::UserGroupCreation(action) => {
                        verify_block(block, &*guard)?;
                        let group_id = GroupId::from_bytes(*action.public_signature_key.as_bytes());
                        let group = Group {
                            group_id,
                            public_signature_key: action.public_signature_key,
                            public_encryption_key: action.public_encryption_key,
                            last_block_hash: block.hash(),
                            last_key_rotation_block_hash: block.hash(),
                            private_keys: None,
                            sealed_private_signature_key: action.sealed_private_signature_key.clone(),
                        };
                        self.local_store.put_group(&group).await?;
                        found.push(group);
                    }
                    Action::UserGroupAddition(action) => {
                        if let Some(mut group) = self.local_store.group(&action.group_id).await? {
                            group.last_block_hash = block.hash();
                            self.local_store.put_group(&group).await?;
                            if let Some(existing) = found.iter_mut().find(|g| g.group_id == group.group_id) {
                                *existing = group;
                            } else {
                                found.push(group);
                            }
                        }
                    }
                    _ => {}
                }
                guard.apply_block(block);
            }
        }

        let found_ids: std::collections::HashSet<[u8; 32]> = found.iter().map(|g| *g.group_id.as_bytes()).collect();
        let not_found = group_ids.iter().filter(|id| !found_ids.contains(id.as_bytes())).copied().collect();
        Ok((found, not_found))
    }

    /// Internal groups are created/updated entirely locally by `tc-groups`
    /// and just need to be persisted; exposed so that crate can reuse the
    /// same store without re-implementing SQL access.
    pub fn local_store(&self) -> &Arc<dyn LocalStore> {
        &self.local_store
    }
}

pub struct ProvisionalUserAccessor {
    trustchain_id: TrustchainId,
    state: Arc<Mutex<ChainState>>,
    requester: Arc<dyn Requester>,
    local_store: Arc<dyn LocalStore>,
}

impl ProvisionalUserAccessor {
    pub fn new(
        trustchain_id: TrustchainId,
        state: Arc<Mutex<ChainState>>,
        requester: Arc<dyn Requester>,
        local_store: Arc<dyn LocalStore>,
    ) -> Self {
        Self { trustchain_id, state, requester, local_store }
    }

    pub async fn find_encryption_keys_from_cache(
        &self,
        app_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
        tanker_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
    ) -> Result<Option<ProvisionalUserKeys>, StoreError> {
        self.local_store.provisional_user_keys(app_public_signature_key, tanker_public_signature_key).await
    }

    /// Refresh once on miss. The mapping from `(appPubSig, tankerPubSig)`
    /// to a `ProvisionalUserKeys` pair is taught to the local store by
    /// `tc-share`'s receive pipeline the first time it successfully
    /// unseals a share addressed to this provisional identity (see
    /// `tc-share::receive`); this accessor's job is only to make sure
    /// that teaching has had a chance to happen before giving up. A claim
    /// block proves attachment but never carries plaintext encryption
    /// keys, so seeing one here cannot populate the cache by itself — we
    /// still replay any new blocks for the claiming user so the rest of
    /// the chain state stays current.
    pub async fn pull_encryption_keys(
        &self,
        claiming_user_id: &UserId,
        app_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
        tanker_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
    ) -> Result<Option<ProvisionalUserKeys>, StoreError> {
        if let Some(keys) = self.find_encryption_keys_from_cache(app_public_signature_key, tanker_public_signature_key).await? {
            return Ok(Some(keys));
        }

        let blocks = self.requester.get_user_blocks(&self.trustchain_id, &[*claiming_user_id]).await?;
        let mut sorted = blocks;
        sorted.sort_by_key(|b| b.index);
        let mut guard = self.state.lock().await;
        for block in &sorted {
            if matches!(&block.action, Action::ProvisionalIdentityClaim(_)) {
                verify_block(block, &*guard)?;
            }
            guard.apply_block(block);
        }

        self.find_encryption_keys_from_cache(app_public_signature_key, tanker_public_signature_key).await
    }
}

pub struct LocalUserAccessor {
    trustchain_id: TrustchainId,
    state: Arc<Mutex<ChainState>>,
    requester: Arc<dyn Requester>,
    local_store: Arc<dyn LocalStore>,
}

impl LocalUserAccessor {
    pub fn new(
        trustchain_id: TrustchainId,
        state: Arc<Mutex<ChainState>>,
        requester: Arc<dyn Requester>,
        local_store: Arc<dyn LocalStore>,
    ) -> Self {
        Self { trustchain_id, state, requester, local_store }
    }

    /// Search this device's chronologically ordered user-encryption
    /// keypairs for `public_key`, refreshing from the chain once on miss.
    pub async fn pull_user_key_pair(
        &self,
        public_key: &PublicEncryptionKey,
    ) -> Result<Option<UserKeyPairEntry>, StoreError> {
        let keys = self.local_store.local_user_keys().await?;
        if let Some(found) = keys.iter().find(|k| &k.public_encryption_key == public_key) {
            return Ok(Some(found.clone()));
        }

        let Some(device_keys) = self.local_store.device_keys().await? else {
            return Ok(None);
        };
        let blocks = self.requester.get_user_blocks(&self.trustchain_id, &[device_keys.user_id]).await?;
        let mut sorted = blocks;
        sorted.sort_by_key(|b| b.index);
        let mut guard = self.state.lock().await;
        for block in &sorted {
            verify_block(block, &*guard)?;
            guard.apply_block(block);
        }

        let refreshed = self.local_store.local_user_keys().await?;
        Ok(refreshed.into_iter().find(|k| &k.public_encryption_key == public_key))
    }
}
