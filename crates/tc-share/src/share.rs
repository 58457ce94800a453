//! `resolve_share`: turns a set of resource keys and recipients into the
//! signed `KeyPublish*` blocks, ready to push via `Requester::push_keys`.

use std::sync::Arc;

use tc_crypto::keys::{PublicEncryptionKey, PublicSignatureKey, Signature};
use tc_proto::block::{Action, KeyPublish, KeyPublishToProvisionalUser as KeyPublishToProvisionalUserAction};
use tc_proto::{Block, DeviceId, GroupId, ResourceId, TrustchainId, UserId};
use tc_store::{GroupAccessor, UserAccessor};

use crate::error::ShareError;

/// A resource key this device holds plaintext access to, ready to share.
pub struct ResourceToShare {
    pub resource_id: ResourceId,
    pub key: [u8; 32],
}

/// An unclaimed identity being shared with, already resolved to its two
/// factor keypairs (by email, via `Requester::get_public_provisional_identities`).
pub struct ProvisionalRecipient {
    pub app_public_signature_key: PublicSignatureKey,
    pub tanker_public_signature_key: PublicSignatureKey,
    pub app_public_encryption_key: PublicEncryptionKey,
    pub tanker_public_encryption_key: PublicEncryptionKey,
}

/// The recipients a batch of resources is being shared with.
#[derive(Default)]
pub struct ShareRecipients<'a> {
    pub user_ids: &'a [UserId],
    pub group_ids: &'a [GroupId],
    pub provisional: &'a [ProvisionalRecipient],
    /// Also share with the author's own current user key. `encrypt`
    /// defaults this on; a caller resharing on behalf of someone else
    /// (or deliberately excluding itself) sets it to `false`.
    pub share_with_self: bool,
}

/// This device's identity, needed to author the wrapping blocks.
pub struct AuthorDevice<'a> {
    pub device_id: DeviceId,
    pub signing_keypair: &'a tc_crypto::SigningKeyPair,
    pub user_id: UserId,
    pub current_public_user_encryption_key: PublicEncryptionKey,
}

pub struct ShareResolver {
    trustchain_id: TrustchainId,
    user_accessor: Arc<UserAccessor>,
    group_accessor: Arc<GroupAccessor>,
}

impl ShareResolver {
    pub fn new(trustchain_id: TrustchainId, user_accessor: Arc<UserAccessor>, group_accessor: Arc<GroupAccessor>) -> Self {
        Self { trustchain_id, user_accessor, group_accessor }
    }

    fn sign_block(&self, author: &AuthorDevice<'_>, action: Action) -> Block {
        let mut block = Block {
            index: 0,
            trustchain_id: self.trustchain_id,
            action,
            author: tc_crypto::keys::Hash::from_bytes(*author.device_id.as_bytes()),
            signature: Signature::from_bytes([0u8; 64]),
        };
        block.signature = tc_crypto::sign::sign(author.signing_keypair, &block.signed_payload());
        block
    }

    /// Resolve `resources` shared with `recipients` into signed
    /// `KeyPublish*` blocks. Callers still need to `push_keys` the result.
    pub async fn resolve_share(
        &self,
        author: &AuthorDevice<'_>,
        resources: &[ResourceToShare],
        recipients: &ShareRecipients<'_>,
    ) -> Result<Vec<Block>, ShareError> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let nothing_to_share = recipients.user_ids.is_empty()
            && recipients.group_ids.is_empty()
            && recipients.provisional.is_empty()
            && !recipients.share_with_self;
        if nothing_to_share {
            return Err(ShareError::NothingToShare);
        }

        let (users, not_found_users) = self.user_accessor.pull(recipients.user_ids).await?;
        if let Some(missing) = not_found_users.first() {
            return Err(ShareError::UserNotFound(*missing));
        }
        let (groups, not_found_groups) = self.group_accessor.pull(recipients.group_ids).await?;
        if let Some(missing) = not_found_groups.first() {
            return Err(ShareError::GroupNotFound(*missing));
        }

        let mut blocks = Vec::with_capacity(
            resources.len() * (users.len() + groups.len() + recipients.provisional.len() + 1),
        );

        for resource in resources {
            for user in &users {
                let recipient_key = user
                    .current_public_user_encryption_key
                    .ok_or(ShareError::UserMissingUserKey(user.user_id))?;
                blocks.push(self.sign_block(
                    author,
                    Action::KeyPublishToUser(KeyPublish {
                        recipient_public_encryption_key: recipient_key,
                        resource_id: resource.resource_id,
                        sealed_key: tc_crypto::seal::seal_encrypt(&recipient_key, &resource.key)?,
                    }),
                ));
            }

            for group in &groups {
                blocks.push(self.sign_block(
                    author,
                    Action::KeyPublishToUserGroup(KeyPublish {
                        recipient_public_encryption_key: group.public_encryption_key,
                        resource_id: resource.resource_id,
                        sealed_key: tc_crypto::seal::seal_encrypt(&group.public_encryption_key, &resource.key)?,
                    }),
                ));
            }

            for p in recipients.provisional {
                let once = tc_crypto::seal::seal_encrypt(&p.app_public_encryption_key, &resource.key)?;
                let twice = tc_crypto::seal::seal_encrypt(&p.tanker_public_encryption_key, &once)?;
                blocks.push(self.sign_block(
                    author,
                    Action::KeyPublishToProvisionalUser(KeyPublishToProvisionalUserAction {
                        app_public_signature_key: p.app_public_signature_key,
                        tanker_public_signature_key: p.tanker_public_signature_key,
                        resource_id: resource.resource_id,
                        sealed_key: twice,
                    }),
                ));
            }

            if recipients.share_with_self {
                let self_key = author.current_public_user_encryption_key;
                blocks.push(self.sign_block(
                    author,
                    Action::KeyPublishToUser(KeyPublish {
                        recipient_public_encryption_key: self_key,
                        resource_id: resource.resource_id,
                        sealed_key: tc_crypto::seal::seal_encrypt(&self_key, &resource.key)?,
                    }),
                ));
            }
        }

        Ok(blocks)
    }
}
