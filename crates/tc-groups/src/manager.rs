//! `createGroup`/`updateGroupMembers`: builds the signed `UserGroupCreation`
//! / `UserGroupAddition` blocks, and persists the resulting internal-group
//! record locally.

use std::sync::Arc;

use tc_crypto::keys::{PublicEncryptionKey, PublicSignatureKey};
use tc_crypto::{EncryptionKeyPair, SigningKeyPair};
use tc_proto::block::{Action, GroupMember, GroupProvisionalMember, UserGroupAddition, UserGroupCreation};
use tc_proto::{Block, DeviceId, GroupId, Nature, TrustchainId, UserId};
use tc_store::models::{Group, GroupPrivateKeys};
use tc_store::LocalStore;

use crate::error::GroupsError;

/// An existing user being added to a group, resolved via `UserAccessor`.
pub struct MemberRecipient {
    pub user_id: UserId,
    pub current_public_user_encryption_key: PublicEncryptionKey,
}

/// A provisional (unclaimed) identity being added to a group.
pub struct ProvisionalMemberRecipient {
    pub app_public_signature_key: PublicSignatureKey,
    pub tanker_public_signature_key: PublicSignatureKey,
    pub app_public_encryption_key: PublicEncryptionKey,
    pub tanker_public_encryption_key: PublicEncryptionKey,
}

/// This device's identity, needed to author the wrapping block.
pub struct AuthorDevice<'a> {
    pub device_id: DeviceId,
    pub signing_keypair: &'a SigningKeyPair,
}

pub struct GroupManager {
    trustchain_id: TrustchainId,
    local_store: Arc<dyn LocalStore>,
}

impl GroupManager {
    pub fn new(trustchain_id: TrustchainId, local_store: Arc<dyn LocalStore>) -> Self {
        Self { trustchain_id, local_store }
    }

    /// Resolve a known user's current encryption key into a
    /// [`MemberRecipient`], failing if the user has never registered one
    /// (e.g. a user with only non-upgraded devices).
    pub fn resolve_member(user: &tc_store::models::User) -> Result<MemberRecipient, GroupsError> {
        let current_public_user_encryption_key = user
            .current_public_user_encryption_key
            .ok_or(GroupsError::MemberMissingUserKey(user.user_id))?;
        Ok(MemberRecipient { user_id: user.user_id, current_public_user_encryption_key })
    }

    fn build_member_entries(
        members: &[MemberRecipient],
        group_encryption_secret: &[u8; 32],
    ) -> Result<Vec<GroupMember>, GroupsError> {
        members
            .iter()
            .map(|member| {
                let sealed = tc_crypto::seal::seal_encrypt(
                    &member.current_public_user_encryption_key,
                    group_encryption_secret,
                )?;
                Ok(GroupMember {
                    user_id: Some(member.user_id),
                    public_user_encryption_key: member.current_public_user_encryption_key,
                    sealed_private_group_encryption_key: sealed,
                })
            })
            .collect()
    }

    fn build_provisional_entries(
        provisional_members: &[ProvisionalMemberRecipient],
        group_encryption_secret: &[u8; 32],
    ) -> Result<Vec<GroupProvisionalMember>, GroupsError> {
        provisional_members
            .iter()
            .map(|p| {
                let once = tc_crypto::seal::seal_encrypt(&p.app_public_encryption_key, group_encryption_secret)?;
                let twice = tc_crypto::seal::seal_encrypt(&p.tanker_public_encryption_key, &once)?;
                Ok(GroupProvisionalMember {
                    app_public_signature_key: p.app_public_signature_key,
                    tanker_public_signature_key: p.tanker_public_signature_key,
                    app_public_encryption_key: Some(p.app_public_encryption_key),
                    tanker_public_encryption_key: Some(p.tanker_public_encryption_key),
                    two_times_sealed_group_key: twice,
                })
            })
            .collect()
    }

    fn canonical_creation_signature_payload(action: &UserGroupCreation) -> Vec<u8> {
        let mut w = tc_proto::wire::WireWriter::new();
        for m in &action.members {
            if let Some(id) = &m.user_id {
                w.write_fixed(id.as_bytes());
            }
            w.write_fixed(m.public_user_encryption_key.as_bytes());
            w.write_bytes(&m.sealed_private_group_encryption_key);
        }
        for m in &action.provisional_members {
            w.write_fixed(m.app_public_signature_key.as_bytes());
            w.write_fixed(m.tanker_public_signature_key.as_bytes());
            w.write_bytes(&m.two_times_sealed_group_key);
        }
        w.write_fixed(action.public_signature_key.as_bytes());
        w.write_fixed(action.public_encryption_key.as_bytes());
        w.write_fixed(&action.sealed_private_signature_key);
        w.into_bytes()
    }

    fn canonical_addition_signature_payload(action: &UserGroupAddition) -> Vec<u8> {
        let mut w = tc_proto::wire::WireWriter::new();
        w.write_fixed(action.group_id.as_bytes());
        for m in &action.members {
            if let Some(id) = &m.user_id {
                w.write_fixed(id.as_bytes());
            }
            w.write_fixed(m.public_user_encryption_key.as_bytes());
            w.write_bytes(&m.sealed_private_group_encryption_key);
        }
        for m in &action.provisional_members {
            w.write_fixed(m.app_public_signature_key.as_bytes());
            w.write_fixed(m.tanker_public_signature_key.as_bytes());
            w.write_bytes(&m.two_times_sealed_group_key);
        }
        w.into_bytes()
    }

    /// Generate a fresh group, sign it, and return both the wrapping
    /// block (ready to push) and the locally-persisted internal-group
    /// record. Callers must still push the returned block.
    pub async fn create_group(
        &self,
        author: &AuthorDevice<'_>,
        members: &[MemberRecipient],
        provisional_members: &[ProvisionalMemberRecipient],
    ) -> Result<(Block, Group), GroupsError> {
        if members.is_empty() && provisional_members.is_empty() {
            return Err(GroupsError::EmptyGroup);
        }

        let group_signature_keypair = SigningKeyPair::generate();
        let group_encryption_keypair = EncryptionKeyPair::generate();
        let group_encryption_secret = group_encryption_keypair.secret_bytes();

        let member_entries = Self::build_member_entries(members, &group_encryption_secret)?;
        let provisional_entries = Self::build_provisional_entries(provisional_members, &group_encryption_secret)?;

        let sealed_private_signature_key = tc_crypto::seal::seal_encrypt(
            &group_encryption_keypair.public(),
            group_signature_keypair.secret_bytes(),
        )?;

        let mut action = UserGroupCreation {
            public_signature_key: group_signature_keypair.public(),
            public_encryption_key: group_encryption_keypair.public(),
            sealed_private_signature_key,
            members: member_entries,
            provisional_members: provisional_entries,
            self_signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        let signature_payload = Self::canonical_creation_signature_payload(&action);
        action.self_signature = tc_crypto::sign::sign(&group_signature_keypair, &signature_payload);

        let mut block = Block {
            index: 0,
            trustchain_id: self.trustchain_id,
            action: Action::UserGroupCreation(action.clone()),
            author: tc_crypto::keys::Hash::from_bytes(*author.device_id.as_bytes()),
            signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        block.signature = tc_crypto::sign::sign(author.signing_keypair, &block.signed_payload());

        let group_id = GroupId::from_bytes(*action.public_signature_key.as_bytes());
        let group_hash = block.hash();
        let record = Group {
            group_id,
            public_signature_key: action.public_signature_key,
            public_encryption_key: action.public_encryption_key,
            last_block_hash: group_hash,
            last_key_rotation_block_hash: group_hash,
            private_keys: Some(GroupPrivateKeys {
                signature_keypair_secret: *group_signature_keypair.secret_bytes(),
                encryption_keypair_secret: group_encryption_secret,
            }),
            sealed_private_signature_key: action.sealed_private_signature_key.clone(),
        };
        self.local_store.put_group(&record).await?;

        Ok((block, record))
    }

    /// Add members to an existing internal group.
    pub async fn update_group_members(
        &self,
        author: &AuthorDevice<'_>,
        group_id: &GroupId,
        new_members: &[MemberRecipient],
        new_provisional_members: &[ProvisionalMemberRecipient],
    ) -> Result<(Block, Group), GroupsError> {
        let group = self.local_store.group(group_id).await?.ok_or(GroupsError::GroupNotFound(*group_id))?;
        let private_keys = group.private_keys.as_ref().ok_or(GroupsError::GroupNotInternal(*group_id))?;

        if new_members.is_empty() && new_provisional_members.is_empty() {
            return Err(GroupsError::EmptyGroup);
        }

        let member_entries = Self::build_member_entries(new_members, &private_keys.encryption_keypair_secret)?;
        let provisional_entries =
            Self::build_provisional_entries(new_provisional_members, &private_keys.encryption_keypair_secret)?;

        let mut action = UserGroupAddition {
            group_id: *group_id,
            previous_group_block_hash: group.last_block_hash,
            members: member_entries,
            provisional_members: provisional_entries,
            self_signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        let signature_payload = Self::canonical_addition_signature_payload(&action);
        let group_signing_keypair = SigningKeyPair::from_secret_bytes(private_keys.signature_keypair_secret);
        action.self_signature = tc_crypto::sign::sign(&group_signing_keypair, &signature_payload);

        let mut block = Block {
            index: 0,
            trustchain_id: self.trustchain_id,
            action: Action::UserGroupAddition(action.clone()),
            author: tc_crypto::keys::Hash::from_bytes(*author.device_id.as_bytes()),
            signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        block.signature = tc_crypto::sign::sign(author.signing_keypair, &block.signed_payload());

        let mut updated = group.clone();
        updated.last_block_hash = block.hash();
        self.local_store.put_group(&updated).await?;

        Ok((block, updated))
    }
}

/// Discriminates which nature a freshly-built group block used, mostly
/// useful for logging/metrics at the call site.
pub fn group_block_nature(block: &Block) -> Nature {
    block.action.nature()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_store::db::Db;
    use tc_store::SqliteLocalStore;

    async fn store() -> Arc<dyn LocalStore> {
        Arc::new(SqliteLocalStore::new(Db::open_in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn create_group_rejects_empty_membership() {
        let manager = GroupManager::new(TrustchainId::null(), store().await);
        let device_key = SigningKeyPair::generate();
        let author = AuthorDevice { device_id: DeviceId::from_bytes([1u8; 32]), signing_keypair: &device_key };
        let result = manager.create_group(&author, &[], &[]).await;
        assert!(matches!(result, Err(GroupsError::EmptyGroup)));
    }

    #[tokio::test]
    async fn create_group_produces_a_verifiable_self_signature() {
        let manager = GroupManager::new(TrustchainId::null(), store().await);
        let device_key = SigningKeyPair::generate();
        let author = AuthorDevice { device_id: DeviceId::from_bytes([1u8; 32]), signing_keypair: &device_key };
        let member = MemberRecipient {
            user_id: UserId::from_bytes([2u8; 32]),
            current_public_user_encryption_key: EncryptionKeyPair::generate().public(),
        };
        let (block, record) = manager.create_group(&author, &[member], &[]).await.unwrap();

        let Action::UserGroupCreation(action) = &block.action else { panic!("wrong action") };
        let payload = GroupManager::canonical_creation_signature_payload(action);
        assert!(tc_crypto::sign::verify(&action.public_signature_key, &payload, &action.self_signature).is_ok());
        assert_eq!(record.group_id.as_bytes(), action.public_signature_key.as_bytes());
        assert!(record.is_internal());
    }

    #[tokio::test]
    async fn update_group_members_requires_internal_group() {
        let local_store = store().await;
        let manager = GroupManager::new(TrustchainId::null(), local_store.clone());
        let external_group = Group {
            group_id: GroupId::from_bytes([9u8; 32]),
            public_signature_key: PublicSignatureKey::from_bytes([9u8; 32]),
            public_encryption_key: PublicEncryptionKey::from_bytes([8u8; 32]),
            last_block_hash: tc_crypto::keys::Hash::from_bytes([0u8; 32]),
            last_key_rotation_block_hash: tc_crypto::keys::Hash::from_bytes([0u8; 32]),
            private_keys: None,
            sealed_private_signature_key: vec![0u8; 80],
        };
        local_store.put_group(&external_group).await.unwrap();

        let device_key = SigningKeyPair::generate();
        let author = AuthorDevice { device_id: DeviceId::from_bytes([1u8; 32]), signing_keypair: &device_key };
        let member = MemberRecipient {
            user_id: UserId::from_bytes([2u8; 32]),
            current_public_user_encryption_key: EncryptionKeyPair::generate().public(),
        };
        let result = manager.update_group_members(&author, &external_group.group_id, &[member], &[]).await;
        assert!(matches!(result, Err(GroupsError::GroupNotInternal(_))));
    }
}
