//! Per-nature verification rules (spec table in `tc-proto::block`'s module
//! doc comment). Every function here is pure: given a block and a
//! [`VerificationContext`] snapshot, it returns `Ok(())` or a categorical
//! [`VerifyError`] — no I/O, no mutation.

use tc_crypto::hash::generichash;
use tc_proto::block::{Action, DeviceCreation, DeviceRevocation, UserGroupAddition, UserGroupCreation};
use tc_proto::{Block, Nature};

use crate::context::VerificationContext;
use crate::error::VerifyError;

pub fn verify_block(block: &Block, ctx: &dyn VerificationContext) -> Result<(), VerifyError> {
    match &block.action {
        Action::TrustchainCreation(_) => verify_trustchain_creation(block),
        Action::DeviceCreation(action) => verify_device_creation(block, action, ctx),
        Action::DeviceRevocation(action) => verify_device_revocation(block, action, ctx),
        Action::KeyPublishToUser(_)
        | Action::KeyPublishToUserGroup(_)
        | Action::KeyPublishToProvisionalUser(_) => verify_key_publish(block, ctx),
        Action::KeyPublishToDevice(_) => {
            // Legacy nature: accepted for parsing old chains, never freshly
            // verified against current author/revocation state.
            Ok(())
        }
        Action::UserGroupCreation(action) => verify_user_group_creation(block, action, ctx),
        Action::UserGroupAddition(action) => verify_user_group_addition(block, action, ctx),
        Action::ProvisionalIdentityClaim(action) => verify_provisional_identity_claim(block, action, ctx),
    }
}

fn verify_signature(block: &Block, public: &tc_crypto::keys::PublicSignatureKey) -> Result<(), VerifyError> {
    tc_crypto::sign::verify(public, &block.signed_payload(), &block.signature)
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))
}

fn verify_trustchain_creation(block: &Block) -> Result<(), VerifyError> {
    if block.index != 1 {
        return Err(VerifyError::InvalidHash("trustchain creation must be block index 1".into()));
    }
    if !block.author.is_null() {
        return Err(VerifyError::InvalidAuthor("trustchain creation author must be the zero hash".into()));
    }
    if block.signature.as_bytes() != &[0u8; 64] {
        return Err(VerifyError::InvalidSignature("trustchain creation carries no signature".into()));
    }
    let mut expected = block.clone();
    expected.trustchain_id = tc_proto::TrustchainId::null();
    let expected_id = generichash(&expected.encode());
    if expected_id.as_bytes() != block.trustchain_id.as_bytes() {
        return Err(VerifyError::InvalidHash("trustchainId does not match hash of its own creation block".into()));
    }
    Ok(())
}

fn verify_device_creation(
    block: &Block,
    action: &DeviceCreation,
    ctx: &dyn VerificationContext,
) -> Result<(), VerifyError> {
    if let Some(reset) = &action.last_reset {
        if !reset.is_null() {
            return Err(VerifyError::InvalidLastResetField(
                "lastReset must be all-zero to be convertible to v1".into(),
            ));
        }
    }

    verify_signature(block, &action.ephemeral_public_signature_key)?;

    let mut delegation_payload = Vec::with_capacity(64);
    delegation_payload.extend_from_slice(action.ephemeral_public_signature_key.as_bytes());
    delegation_payload.extend_from_slice(action.user_id.as_bytes());

    let author_key = ctx
        .author_public_signature_key(&block.author)
        .ok_or_else(|| VerifyError::InvalidAuthor("author block not found".into()))?;

    tc_crypto::sign::verify(&author_key, &delegation_payload, &action.delegation_signature)
        .map_err(|e| VerifyError::InvalidDelegationSignature(e.to_string()))?;

    if let Some(author_device) = ctx.author_device(&block.author) {
        if author_device.user_id != action.user_id {
            return Err(VerifyError::InvalidUserId(
                "device creation's userId does not match the authoring device's user".into(),
            ));
        }
    }

    if action.version() == 3 {
        if let Some(existing_user) = ctx.user(&action.user_id) {
            if let (Some(current), Some(uk)) =
                (existing_user.current_public_encryption_key(), &action.user_key)
            {
                if current != &uk.public_user_encryption_key {
                    return Err(VerifyError::InvalidUserKey(
                        "v3 device creation's user key does not match the user's current key".into(),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn verify_device_revocation(
    block: &Block,
    action: &DeviceRevocation,
    ctx: &dyn VerificationContext,
) -> Result<(), VerifyError> {
    let author_device = ctx
        .author_device(&block.author)
        .ok_or_else(|| VerifyError::InvalidAuthor("revocation author is not a known device".into()))?;
    if author_device.is_revoked {
        return Err(VerifyError::InvalidAuthor("revocation author device is itself revoked".into()));
    }
    verify_signature(block, &author_device.public_signature_key)?;

    let target = ctx
        .device(&action.target_device_id)
        .ok_or_else(|| VerifyError::InvalidTargetDevice("target device not found".into()))?;
    if target.user_id != author_device.user_id {
        return Err(VerifyError::InvalidTargetDevice("target device belongs to a different user".into()));
    }

    let user = ctx
        .user(&author_device.user_id)
        .ok_or_else(|| VerifyError::InvalidUser("revoking user not found".into()))?;

    match &action.user_key_rotation {
        None => {
            if user.has_user_key() {
                return Err(VerifyError::InvalidUserKeys(
                    "user already has a user key; a v2 rotation revocation is required".into(),
                ));
            }
        }
        Some(rotation) => {
            let current = user
                .current_public_encryption_key()
                .ok_or_else(|| VerifyError::InvalidUserKeys("user has no current user key to rotate".into()))?;
            if current != &rotation.previous_public_encryption_key {
                return Err(VerifyError::InvalidUserKeys(
                    "previousPublicEncryptionKey does not match the user's current key".into(),
                ));
            }
            let expected_count = user
                .device_ids
                .iter()
                .filter(|id| **id != action.target_device_id)
                .count();
            if rotation.sealed_user_keys_for_devices.len() != expected_count {
                return Err(VerifyError::InvalidUserKeys(
                    "sealedUserKeysForDevices must have exactly one entry per remaining device".into(),
                ));
            }
            let mut seen = std::collections::HashSet::new();
            for (device_id, _) in &rotation.sealed_user_keys_for_devices {
                if *device_id == action.target_device_id {
                    return Err(VerifyError::InvalidUserKeys(
                        "sealedUserKeysForDevices must not contain the revoked device".into(),
                    ));
                }
                if !seen.insert(*device_id) {
                    return Err(VerifyError::InvalidUserKeys(
                        "sealedUserKeysForDevices contains a duplicate device".into(),
                    ));
                }
            }
        }
    }

    Ok(())
}

fn verify_key_publish(block: &Block, ctx: &dyn VerificationContext) -> Result<(), VerifyError> {
    let author_device = ctx
        .author_device(&block.author)
        .ok_or_else(|| VerifyError::InvalidAuthor("key publish author is not a known device".into()))?;
    if author_device.is_revoked {
        return Err(VerifyError::InvalidAuthor("key publish author device is revoked".into()));
    }
    verify_signature(block, &author_device.public_signature_key)
}

fn canonical_group_signature_payload(
    members_and_keys: &[u8],
    group_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
    group_public_encryption_key: &tc_crypto::keys::PublicEncryptionKey,
    sealed_private_signature_key: &[u8],
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(members_and_keys);
    payload.extend_from_slice(group_public_signature_key.as_bytes());
    payload.extend_from_slice(group_public_encryption_key.as_bytes());
    payload.extend_from_slice(sealed_private_signature_key);
    payload
}

fn serialize_members_for_signature(action: &UserGroupCreation) -> Vec<u8> {
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
    w.into_bytes()
}

fn verify_user_group_creation(
    block: &Block,
    action: &UserGroupCreation,
    ctx: &dyn VerificationContext,
) -> Result<(), VerifyError> {
    let author_device = ctx
        .author_device(&block.author)
        .ok_or_else(|| VerifyError::InvalidAuthor("group creation author is not a known device".into()))?;
    verify_signature(block, &author_device.public_signature_key)?;

    let group_id = tc_proto::GroupId::from_bytes(*action.public_signature_key.as_bytes());
    if ctx.group(&group_id).is_some() {
        return Err(VerifyError::InvalidGroup("groupId is already known".into()));
    }

    let members_bytes = serialize_members_for_signature(action);
    let payload = canonical_group_signature_payload(
        &members_bytes,
        &action.public_signature_key,
        &action.public_encryption_key,
        &action.sealed_private_signature_key,
    );
    tc_crypto::sign::verify(&action.public_signature_key, &payload, &action.self_signature)
        .map_err(|e| VerifyError::InvalidGroup(format!("self-signature invalid: {e}")))
}

fn serialize_members_for_addition_signature(action: &UserGroupAddition) -> Vec<u8> {
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
    w.into_bytes()
}

fn verify_user_group_addition(
    block: &Block,
    action: &UserGroupAddition,
    ctx: &dyn VerificationContext,
) -> Result<(), VerifyError> {
    let author_device = ctx
        .author_device(&block.author)
        .ok_or_else(|| VerifyError::InvalidAuthor("group addition author is not a known device".into()))?;
    verify_signature(block, &author_device.public_signature_key)?;

    let group = ctx
        .group(&action.group_id)
        .ok_or_else(|| VerifyError::InvalidGroup("group not found".into()))?;
    if group.last_block_hash.as_bytes() != action.previous_group_block_hash.as_bytes() {
        return Err(VerifyError::InvalidGroup(
            "previousGroupBlockHash does not match the group's last block".into(),
        ));
    }

    let mut payload = Vec::new();
    payload.extend_from_slice(action.group_id.as_bytes());
    payload.extend_from_slice(&serialize_members_for_addition_signature(action));
    tc_crypto::sign::verify(&group.public_signature_key, &payload, &action.self_signature)
        .map_err(|e| VerifyError::InvalidGroup(format!("self-signature invalid: {e}")))
}

fn verify_provisional_identity_claim(
    block: &Block,
    action: &tc_proto::block::ProvisionalIdentityClaim,
    ctx: &dyn VerificationContext,
) -> Result<(), VerifyError> {
    let author_device = ctx
        .author_device(&block.author)
        .ok_or_else(|| VerifyError::InvalidAuthor("claim author is not a known device".into()))?;
    verify_signature(block, &author_device.public_signature_key)?;

    if author_device.user_id != action.user_id {
        return Err(VerifyError::InvalidUserId(
            "claim's userId does not match the authoring device's user".into(),
        ));
    }

    let user = ctx
        .user(&action.user_id)
        .ok_or_else(|| VerifyError::InvalidUser("claiming user not found".into()))?;
    if user.current_public_encryption_key() != Some(&action.recipient_user_public_encryption_key) {
        return Err(VerifyError::InvalidEncryptionKey(
            "recipientUserPublicEncryptionKey does not match the claiming user's current key".into(),
        ));
    }

    let mut delegation_payload = Vec::new();
    delegation_payload.extend_from_slice(action.user_id.as_bytes());
    delegation_payload.extend_from_slice(action.recipient_user_public_encryption_key.as_bytes());

    tc_crypto::sign::verify(
        &action.app_signature_public_key,
        &delegation_payload,
        &action.author_signature_by_app_key,
    )
    .map_err(|e| VerifyError::InvalidDelegationSignature(format!("app key signature invalid: {e}")))?;

    tc_crypto::sign::verify(
        &action.tanker_signature_public_key,
        &delegation_payload,
        &action.author_signature_by_tanker_key,
    )
    .map_err(|e| VerifyError::InvalidDelegationSignature(format!("tanker key signature invalid: {e}")))?;

    Ok(())
}

/// Nature-to-check-kind helper used by callers that want to branch before
/// fully decoding (e.g. to skip verifying legacy natures during a chain replay).
pub fn is_legacy_readonly(nature: Nature) -> bool {
    matches!(nature, Nature::KeyPublishToDevice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tc_crypto::keys::{PublicEncryptionKey, PublicSignatureKey};
    use tc_crypto::SigningKeyPair;
    use tc_proto::block::TrustchainCreation;

    use crate::context::{DeviceInfo, GroupInfo, UserInfo};

    #[derive(Default)]
    struct FakeContext {
        authors: HashMap<[u8; 32], PublicSignatureKey>,
        devices_by_author: HashMap<[u8; 32], DeviceInfo>,
        devices: HashMap<[u8; 32], DeviceInfo>,
        users: HashMap<[u8; 32], UserInfo>,
        groups: HashMap<[u8; 32], GroupInfo>,
    }

    impl VerificationContext for FakeContext {
        fn author_public_signature_key(&self, author: &Hash) -> Option<PublicSignatureKey> {
            self.authors.get(author.as_bytes()).copied()
        }
        fn author_device(&self, author: &Hash) -> Option<DeviceInfo> {
            self.devices_by_author.get(author.as_bytes()).cloned()
        }
        fn user(&self, user_id: &tc_proto::UserId) -> Option<UserInfo> {
            self.users.get(user_id.as_bytes()).cloned()
        }
        fn device(&self, device_id: &tc_proto::DeviceId) -> Option<DeviceInfo> {
            self.devices.get(device_id.as_bytes()).cloned()
        }
        fn group(&self, group_id: &tc_proto::GroupId) -> Option<GroupInfo> {
            self.groups.get(group_id.as_bytes()).cloned()
        }
    }

    use tc_crypto::keys::Hash;

    fn signed_trustchain_creation() -> Block {
        let root = SigningKeyPair::generate();
        let mut block = Block {
            index: 1,
            trustchain_id: tc_proto::TrustchainId::null(),
            action: Action::TrustchainCreation(TrustchainCreation { public_signature_key: root.public() }),
            author: Hash::null(),
            signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        let expected_id = generichash(&block.encode());
        block.trustchain_id = tc_proto::TrustchainId::from_bytes(*expected_id.as_bytes());
        block
    }

    #[test]
    fn trustchain_creation_verifies() {
        let ctx = FakeContext::default();
        let block = signed_trustchain_creation();
        assert!(verify_block(&block, &ctx).is_ok());
    }

    #[test]
    fn trustchain_creation_rejects_wrong_trustchain_id() {
        let ctx = FakeContext::default();
        let mut block = signed_trustchain_creation();
        block.trustchain_id = tc_proto::TrustchainId::from_bytes([1u8; 32]);
        assert!(verify_block(&block, &ctx).is_err());
    }

    #[test]
    fn device_creation_verifies_signature_and_delegation() {
        let mut ctx = FakeContext::default();
        let root = SigningKeyPair::generate();
        let trustchain_author = Hash::from_bytes([9u8; 32]);
        ctx.authors.insert(*trustchain_author.as_bytes(), root.public());

        let ephemeral = SigningKeyPair::generate();
        let user_id = tc_proto::UserId::from_bytes([3u8; 32]);
        let mut delegation_payload = Vec::new();
        delegation_payload.extend_from_slice(ephemeral.public().as_bytes());
        delegation_payload.extend_from_slice(user_id.as_bytes());
        let delegation_signature = root.sign(&delegation_payload);

        let action = DeviceCreation {
            last_reset: None,
            ephemeral_public_signature_key: ephemeral.public(),
            user_id,
            delegation_signature,
            public_signature_key: ephemeral.public(),
            public_encryption_key: PublicEncryptionKey::from_bytes([4u8; 32]),
            user_key: None,
        };

        let mut block = Block {
            index: 2,
            trustchain_id: tc_proto::TrustchainId::from_bytes([1u8; 32]),
            action: Action::DeviceCreation(action),
            author: trustchain_author,
            signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        block.signature = ephemeral.sign(&block.signed_payload());

        assert!(verify_block(&block, &ctx).is_ok());
    }

    #[test]
    fn device_creation_rejects_tampered_delegation() {
        let mut ctx = FakeContext::default();
        let root = SigningKeyPair::generate();
        let trustchain_author = Hash::from_bytes([9u8; 32]);
        ctx.authors.insert(*trustchain_author.as_bytes(), root.public());

        let ephemeral = SigningKeyPair::generate();
        let user_id = tc_proto::UserId::from_bytes([3u8; 32]);
        let bogus_signature = ephemeral.sign(b"not the real delegation payload");

        let action = DeviceCreation {
            last_reset: None,
            ephemeral_public_signature_key: ephemeral.public(),
            user_id,
            delegation_signature: bogus_signature,
            public_signature_key: ephemeral.public(),
            public_encryption_key: PublicEncryptionKey::from_bytes([4u8; 32]),
            user_key: None,
        };

        let mut block = Block {
            index: 2,
            trustchain_id: tc_proto::TrustchainId::from_bytes([1u8; 32]),
            action: Action::DeviceCreation(action),
            author: trustchain_author,
            signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        block.signature = ephemeral.sign(&block.signed_payload());

        assert!(verify_block(&block, &ctx).is_err());
    }
}
