//! `receive_key`: resolves a resource id to its symmetric key, pulling
//! and unwrapping `KeyPublish*` blocks on cache miss.

use std::sync::Arc;

use tc_crypto::dh::EncryptionKeyPair;
use tc_proto::block::Action;
use tc_proto::{AnyResourceId, Block, Requester, ResourceId, TrustchainId};
use tc_store::models::SymmetricKeyBytes;
use tc_store::{GroupAccessor, LocalStore, LocalUserAccessor, ProvisionalUserAccessor};

use crate::error::ShareError;

pub struct KeyReceiver {
    trustchain_id: TrustchainId,
    requester: Arc<dyn Requester>,
    local_store: Arc<dyn LocalStore>,
    local_user_accessor: Arc<LocalUserAccessor>,
    group_accessor: Arc<GroupAccessor>,
    provisional_user_accessor: Arc<ProvisionalUserAccessor>,
}

impl KeyReceiver {
    pub fn new(
        trustchain_id: TrustchainId,
        requester: Arc<dyn Requester>,
        local_store: Arc<dyn LocalStore>,
        local_user_accessor: Arc<LocalUserAccessor>,
        group_accessor: Arc<GroupAccessor>,
        provisional_user_accessor: Arc<ProvisionalUserAccessor>,
    ) -> Self {
        Self { trustchain_id, requester, local_store, local_user_accessor, group_accessor, provisional_user_accessor }
    }

    /// Resolve `resource_id`'s symmetric key, fetching and unwrapping a
    /// key-publish block if it isn't already cached. `subkey_seed`, when
    /// the caller is decrypting a V9/V10 composite-session resource,
    /// lets step 5 (session key → individual key) run without a second
    /// round trip; pass `None` for non-composite resources.
    pub async fn receive_key(
        &self,
        resource_id: &AnyResourceId,
        subkey_seed: Option<&[u8; 32]>,
    ) -> Result<[u8; 32], ShareError> {
        let lookup_id = match resource_id {
            AnyResourceId::Simple(id) => *id,
            AnyResourceId::Composite(id) => id.session_id(),
        };

        if let Some(cached) = self.local_store.resource_key(&lookup_id).await? {
            return Ok(self.derive_individual_key(resource_id, subkey_seed, cached.0));
        }

        let blocks = self.requester.get_key_publishes(&self.trustchain_id, &[lookup_id]).await?;
        let key = self.unwrap_first_key_publish(&lookup_id, &blocks).await?;

        self.local_store.put_resource_key(&lookup_id, &SymmetricKeyBytes(key)).await?;
        Ok(self.derive_individual_key(resource_id, subkey_seed, key))
    }

    fn derive_individual_key(&self, resource_id: &AnyResourceId, subkey_seed: Option<&[u8; 32]>, session_key: [u8; 32]) -> [u8; 32] {
        match (resource_id, subkey_seed) {
            (AnyResourceId::Composite(_), Some(seed)) => {
                *tc_crypto::hash::generichash_multi(&[&session_key[..], &seed[..]]).as_bytes()
            }
            _ => session_key,
        }
    }

    async fn unwrap_first_key_publish(&self, resource_id: &ResourceId, blocks: &[Block]) -> Result<[u8; 32], ShareError> {
        for block in blocks {
            let unwrapped = match &block.action {
                Action::KeyPublishToUser(kp) if kp.resource_id == *resource_id => {
                    self.unwrap_to_user(kp).await?
                }
                Action::KeyPublishToUserGroup(kp) if kp.resource_id == *resource_id => {
                    self.unwrap_to_group(kp).await?
                }
                Action::KeyPublishToProvisionalUser(kp) if kp.resource_id == *resource_id => {
                    self.unwrap_to_provisional_user(kp).await?
                }
                _ => continue,
            };
            if let Some(key) = unwrapped {
                return Ok(key);
            }
        }
        Err(ShareError::ResourceKeyNotFound(*resource_id))
    }

    async fn unwrap_to_user(&self, kp: &tc_proto::block::KeyPublish) -> Result<Option<[u8; 32]>, ShareError> {
        let Some(entry) = self.local_user_accessor.pull_user_key_pair(&kp.recipient_public_encryption_key).await? else {
            return Ok(None);
        };
        let Some(secret) = entry.private_encryption_key else { return Ok(None) };
        let keypair = EncryptionKeyPair::from_secret_bytes(secret);
        let plaintext = tc_crypto::seal::seal_decrypt(&keypair, &kp.sealed_key)?;
        Ok(Some(to_key(&plaintext)?))
    }

    async fn unwrap_to_group(&self, kp: &tc_proto::block::KeyPublish) -> Result<Option<[u8; 32]>, ShareError> {
        let Some(group) = self
            .group_accessor
            .local_store()
            .group_by_public_encryption_key(&kp.recipient_public_encryption_key)
            .await?
        else {
            return Ok(None);
        };
        let Some(private_keys) = group.private_keys else { return Ok(None) };
        let keypair = EncryptionKeyPair::from_secret_bytes(private_keys.encryption_keypair_secret);
        let plaintext = tc_crypto::seal::seal_decrypt(&keypair, &kp.sealed_key)?;
        Ok(Some(to_key(&plaintext)?))
    }

    async fn unwrap_to_provisional_user(
        &self,
        kp: &tc_proto::block::KeyPublishToProvisionalUser,
    ) -> Result<Option<[u8; 32]>, ShareError> {
        let Some(keys) = self
            .provisional_user_accessor
            .find_encryption_keys_from_cache(&kp.app_public_signature_key, &kp.tanker_public_signature_key)
            .await?
        else {
            return Ok(None);
        };
        let (Some(tanker_secret), Some(app_secret)) =
            (keys.tanker_encryption_private_key, keys.app_encryption_private_key)
        else {
            return Ok(None);
        };
        let tanker_keypair = EncryptionKeyPair::from_secret_bytes(tanker_secret);
        let once = tc_crypto::seal::seal_decrypt(&tanker_keypair, &kp.sealed_key)?;
        let app_keypair = EncryptionKeyPair::from_secret_bytes(app_secret);
        let plaintext = tc_crypto::seal::seal_decrypt(&app_keypair, &once)?;
        Ok(Some(to_key(&plaintext)?))
    }
}

fn to_key(plaintext: &[u8]) -> Result<[u8; 32], ShareError> {
    plaintext
        .try_into()
        .map_err(|_| ShareError::Crypto(tc_crypto::CryptoError::SealDecrypt))
}
