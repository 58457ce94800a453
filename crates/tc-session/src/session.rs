//! The public facade: [`Session`] wraps the lock-guarded [`SessionState`]
//! and exposes the identity lifecycle plus encrypt/decrypt/share/group
//! operations a caller actually needs.

use std::sync::Arc;

use base64::Engine;
use tc_crypto::dh::EncryptionKeyPair;
use tc_crypto::kdf::generate_salt;
use tc_crypto::keys::{AeadNonce, Hash as CryptoHash, Signature};
use tc_crypto::sign::SigningKeyPair;
use tc_crypto::{aead, random, seal};
use tc_groups::{GroupManager, MemberRecipient};
use tc_proto::block::{
    Action, DeviceCreation, DeviceRevocation, DeviceRevocationUserKeyRotation, DeviceUserKey, ProvisionalIdentityClaim,
};
use tc_proto::{Block, DeviceId, GroupId, Requester, ResourceId, TrustchainId, UserId};
use tc_resource::EncryptorOptions;
use tc_share::{AuthorDevice as ShareAuthorDevice, ProvisionalRecipient, ResourceToShare, ShareRecipients};
use tc_store::local_store::DeviceKeys;
use tc_store::models::{LocalUser, UserKeyPairEntry};
use tc_store::LocalStore;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Error;
use crate::events::{SessionEvent, SessionEvents};
use crate::identity::{Identity, ProvisionalIdentity};
use crate::state::SessionState;
use crate::status::Status;
use crate::verification::{VerificationFactor, VerificationKeyPayload, MAX_VERIFICATION_ATTEMPTS};

/// Encryption version used by `encrypt` when the caller doesn't ask for
/// a transparent session: the simple, non-chunked, explicit-resource-id
/// framing. Callers who need chunked streaming or padding go through
/// `tc_resource::dispatch` directly with their own options.
const DEFAULT_ENCRYPTOR_VERSION: u8 = 5;

/// Who a freshly-encrypted resource, or a reshared one, is shared with.
#[derive(Default)]
pub struct Recipients {
    pub user_ids: Vec<UserId>,
    pub group_ids: Vec<GroupId>,
    pub emails: Vec<String>,
    /// Also share with the author's own current user key. Defaults to
    /// `true` in [`Recipients::default`]; a caller encrypting purely on
    /// someone else's behalf sets this to `false`.
    pub share_with_self: bool,
}

impl Recipients {
    pub fn new() -> Self {
        Self { share_with_self: true, ..Default::default() }
    }
}

pub struct Session {
    state: Arc<AsyncMutex<SessionState>>,
    events: SessionEvents,
}

impl Session {
    pub fn new(requester: Arc<dyn Requester>, local_store: Arc<dyn LocalStore>) -> Self {
        Self { state: Arc::new(AsyncMutex::new(SessionState::new(requester, local_store))), events: SessionEvents::new() }
    }

    pub fn events(&self) -> SessionEvents {
        self.events.clone()
    }

    pub async fn status(&self) -> Status {
        self.state.lock().await.status
    }

    /// Pull the trustchain, and figure out whether this device is already
    /// a recognized, non-revoked member of it.
    pub async fn start(&self, identity: Identity) -> Result<Status, Error> {
        let mut guard = self.state.lock().await;
        guard.trustchain_id = Some(identity.trustchain_id);
        guard.sync_chain().await?;

        if let Some(device_keys) = guard.local_store.device_keys().await? {
            let device_id = device_keys.device_id;
            let device_known_and_live = {
                let chain = guard.chain_state.lock().await;
                chain.devices.get(device_id.as_bytes()).map(|d| !d.is_revoked()).unwrap_or(false)
            };
            if device_known_and_live {
                let signature_keypair = SigningKeyPair::from_secret_bytes(device_keys.signature_secret_key);
                let encryption_keypair = EncryptionKeyPair::from_secret_bytes(device_keys.encryption_secret_key);
                let stored_keys = guard.local_store.local_user_keys().await?;
                guard.local_user = Some(LocalUser {
                    user_id: device_keys.user_id,
                    device_id,
                    signature_keypair,
                    encryption_keypair,
                    user_keys: stored_keys,
                });
                guard.build_runtime();
                guard.status = Status::Ready;
                tracing::info!(user_id = %device_keys.user_id, device_id = %device_id, "session ready from local device keys");
                return Ok(guard.status);
            }
            tracing::warn!(device_id = %device_id, "locally stored device was revoked; re-registration required");
        }

        let status = guard
            .requester
            .user_status(&identity.trustchain_id, &identity.user_id, &identity.public_signature_key())
            .await?;
        guard.pending_identity = Some(identity);
        guard.status =
            if status.user_exists { Status::IdentityVerificationNeeded } else { Status::IdentityRegistrationNeeded };
        Ok(guard.status)
    }

    /// Register a brand-new user: creates the recoverable "ghost" device
    /// from the supplied identity, then a real device authored by it.
    pub async fn register_identity(&self, verification: &VerificationFactor) -> Result<(), Error> {
        verification.validate()?;
        let mut guard = self.state.lock().await;
        if guard.status != Status::IdentityRegistrationNeeded {
            return Err(Error::precondition_failed("no identity is pending registration"));
        }
        let identity = guard.pending_identity.take().ok_or_else(|| Error::internal("pending identity missing"))?;

        let trustchain_root_hash =
            guard.chain_state.lock().await.trustchain_root_hash.ok_or_else(|| Error::internal("trustchain root not synced"))?;

        let user_key_pair = EncryptionKeyPair::generate();
        let ghost_sealed_user_key =
            seal::seal_encrypt(&identity.encryption_key_pair.public(), &user_key_pair.secret_bytes())?;

        let ghost_action = DeviceCreation {
            last_reset: None,
            ephemeral_public_signature_key: identity.public_signature_key(),
            user_id: identity.user_id,
            delegation_signature: identity.delegation_signature,
            public_signature_key: identity.public_signature_key(),
            public_encryption_key: identity.encryption_key_pair.public(),
            user_key: Some(DeviceUserKey {
                public_user_encryption_key: user_key_pair.public(),
                sealed_private_user_encryption_key: ghost_sealed_user_key,
                is_ghost_device: true,
            }),
        };
        let mut ghost_block = Block {
            index: guard.next_chain_index().await,
            trustchain_id: identity.trustchain_id,
            action: Action::DeviceCreation(ghost_action),
            author: CryptoHash::from_bytes(*trustchain_root_hash.as_bytes()),
            signature: Signature::from_bytes([0u8; 64]),
        };
        ghost_block.signature = tc_crypto::sign::sign(&identity.signature_key_pair, &ghost_block.signed_payload());
        guard.push_and_apply(&ghost_block).await?;
        let ghost_device_id = DeviceId::from_bytes(*ghost_block.hash().as_bytes());

        let real_signing_keypair = SigningKeyPair::generate();
        let real_encryption_keypair = EncryptionKeyPair::generate();
        let real_block = self
            .sign_real_device_block(
                &guard,
                &identity.trustchain_id,
                identity.user_id,
                ghost_device_id,
                &identity.signature_key_pair,
                &real_signing_keypair,
                &real_encryption_keypair,
                &user_key_pair,
            )
            .await?;
        guard.push_and_apply(&real_block).await?;
        let real_device_id = DeviceId::from_bytes(*real_block.hash().as_bytes());

        let trustchain_public_signature_key = guard
            .chain_state
            .lock()
            .await
            .block_signature_keys
            .get(trustchain_root_hash.as_bytes())
            .copied()
            .ok_or_else(|| Error::internal("trustchain root signature key not found"))?;

        guard
            .local_store
            .set_device_keys(
                &DeviceKeys {
                    user_id: identity.user_id,
                    device_id: real_device_id,
                    signature_secret_key: *real_signing_keypair.secret_bytes(),
                    encryption_secret_key: real_encryption_keypair.secret_bytes(),
                },
                &trustchain_public_signature_key,
            )
            .await?;
        guard.local_store.push_local_user_key(&user_key_pair.public(), &user_key_pair.secret_bytes()).await?;
        guard.local_store.set_device_initialized(true).await?;

        self.seal_and_store_ghost(&guard, &identity, ghost_device_id, verification).await?;

        guard.local_user = Some(LocalUser {
            user_id: identity.user_id,
            device_id: real_device_id,
            signature_keypair: real_signing_keypair,
            encryption_keypair: real_encryption_keypair,
            user_keys: vec![UserKeyPairEntry {
                public_encryption_key: user_key_pair.public(),
                private_encryption_key: Some(user_key_pair.secret_bytes()),
            }],
        });
        guard.build_runtime();
        guard.status = Status::Ready;
        tracing::info!(user_id = %identity.user_id, device_id = %real_device_id, "identity registered");
        Ok(())
    }

    /// Recover an existing user on a new device, via a verification
    /// factor that unlocks the ghost device's sealed private keys.
    pub async fn verify_identity(&self, verification: &VerificationFactor) -> Result<(), Error> {
        verification.validate()?;
        let mut guard = self.state.lock().await;
        if guard.status != Status::IdentityVerificationNeeded {
            return Err(Error::precondition_failed("no identity is pending verification"));
        }
        let identity = guard.pending_identity.take().ok_or_else(|| Error::internal("pending identity missing"))?;
        let attempt_key = *identity.user_id.as_bytes();

        let attempts = guard.verification_attempts.entry(attempt_key).or_insert(0);
        if *attempts >= MAX_VERIFICATION_ATTEMPTS {
            guard.pending_identity = Some(identity);
            return Err(Error::too_many_attempts("too many failed verification attempts for this identity"));
        }

        let recovery = match self.recover_ghost_secrets(&guard, &identity, verification).await {
            Ok(recovery) => recovery,
            Err(e) => {
                let attempts = guard.verification_attempts.entry(attempt_key).or_insert(0);
                *attempts += 1;
                guard.pending_identity = Some(identity);
                return Err(e);
            }
        };
        guard.verification_attempts.remove(&attempt_key);

        let GhostRecovery { ghost_device_id, ghost_signing_keypair, user_encryption_secret } = recovery;

        let real_signing_keypair = SigningKeyPair::generate();
        let real_encryption_keypair = EncryptionKeyPair::generate();
        let user_key_pair = EncryptionKeyPair::from_secret_bytes(user_encryption_secret);

        let real_block = self
            .sign_real_device_block(
                &guard,
                &identity.trustchain_id,
                identity.user_id,
                ghost_device_id,
                &ghost_signing_keypair,
                &real_signing_keypair,
                &real_encryption_keypair,
                &user_key_pair,
            )
            .await?;
        guard.push_and_apply(&real_block).await?;
        let real_device_id = DeviceId::from_bytes(*real_block.hash().as_bytes());

        let trustchain_root_hash =
            guard.chain_state.lock().await.trustchain_root_hash.ok_or_else(|| Error::internal("trustchain root not synced"))?;
        let trustchain_public_signature_key = guard
            .chain_state
            .lock()
            .await
            .block_signature_keys
            .get(trustchain_root_hash.as_bytes())
            .copied()
            .ok_or_else(|| Error::internal("trustchain root signature key not found"))?;

        guard
            .local_store
            .set_device_keys(
                &DeviceKeys {
                    user_id: identity.user_id,
                    device_id: real_device_id,
                    signature_secret_key: *real_signing_keypair.secret_bytes(),
                    encryption_secret_key: real_encryption_keypair.secret_bytes(),
                },
                &trustchain_public_signature_key,
            )
            .await?;
        guard.local_store.push_local_user_key(&user_key_pair.public(), &user_key_pair.secret_bytes()).await?;
        guard.local_store.set_device_initialized(true).await?;

        guard.local_user = Some(LocalUser {
            user_id: identity.user_id,
            device_id: real_device_id,
            signature_keypair: real_signing_keypair,
            encryption_keypair: real_encryption_keypair,
            user_keys: vec![UserKeyPairEntry {
                public_encryption_key: user_key_pair.public(),
                private_encryption_key: Some(user_key_pair.secret_bytes()),
            }],
        });
        guard.build_runtime();
        guard.status = Status::Ready;
        tracing::info!(user_id = %identity.user_id, device_id = %real_device_id, "identity verified on new device");
        Ok(())
    }

    /// Recover the ghost device's own `(device_id, signing_keypair)` and
    /// the user's current encryption secret, either straight from a
    /// `VerificationKey` factor's payload or by decrypting the
    /// server-stored blob a `VerificationFactor` unlocks.
    ///
    /// If the user's key was rotated by a `DeviceRevocation` v2 issued
    /// after this ghost registered but before this call, the ghost's own
    /// sealed copy of the user key is stale and this recovery fails;
    /// re-registering a fresh ghost is the only way out in that case.
    async fn recover_ghost_secrets(
        &self,
        guard: &SessionState,
        identity: &Identity,
        verification: &VerificationFactor,
    ) -> Result<GhostRecovery, Error> {
        let (ghost_device_id, ghost_signing_secret, ghost_encryption_secret) = if let VerificationFactor::VerificationKey(encoded) = verification {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| Error::invalid_verification(format!("invalid verification key encoding: {e}")))?;
            let payload: VerificationKeyPayload = serde_json::from_slice(&decoded)
                .map_err(|e| Error::invalid_verification(format!("invalid verification key payload: {e}")))?;
            decode_verification_key_payload(&payload)?
        } else {
            let salt_nonce_ciphertext = guard
                .requester
                .get_verification_method(&identity.trustchain_id, &identity.user_id)
                .await?
                .ok_or_else(|| Error::not_found("no verification method registered for this identity"))?;
            if salt_nonce_ciphertext.len() < 16 + 24 {
                return Err(Error::invalid_verification("stored verification blob is truncated"));
            }
            let (salt_bytes, rest) = salt_nonce_ciphertext.split_at(16);
            let (nonce_bytes, ciphertext) = rest.split_at(24);
            let salt: [u8; 16] = salt_bytes.try_into().expect("split_at(16) yields 16 bytes");
            let nonce = AeadNonce::from_bytes(nonce_bytes.try_into().expect("split_at(24) yields 24 bytes"));
            let storage_key = verification.derive_storage_key(&salt)?;
            let plaintext = aead::aead_decrypt(&storage_key, &nonce, ciphertext, b"")
                .map_err(|_| Error::invalid_verification("verification factor did not unlock the stored key"))?;
            let payload: VerificationKeyPayload = serde_json::from_slice(&plaintext)
                .map_err(|e| Error::internal(format!("stored verification payload is corrupt: {e}")))?;
            decode_verification_key_payload(&payload)?
        };

        let ghost_signing_keypair = SigningKeyPair::from_secret_bytes(ghost_signing_secret);
        let ghost_encryption_keypair = EncryptionKeyPair::from_secret_bytes(ghost_encryption_secret);

        let ghost_blocks = guard.requester.get_device_blocks(&identity.trustchain_id, &[ghost_device_id]).await?;
        let ghost_block = ghost_blocks
            .into_iter()
            .find(|b| DeviceId::from_bytes(*b.hash().as_bytes()) == ghost_device_id)
            .ok_or_else(|| Error::not_found("ghost device block not found"))?;
        let Action::DeviceCreation(ghost_action) = ghost_block.action else {
            return Err(Error::internal("ghost device block has the wrong action type"));
        };
        let user_key = ghost_action
            .user_key
            .ok_or_else(|| Error::internal("ghost device block carries no user key"))?;
        let user_encryption_secret: [u8; 32] = seal::seal_decrypt(&ghost_encryption_keypair, &user_key.sealed_private_user_encryption_key)?
            .try_into()
            .map_err(|_| Error::internal("unsealed user encryption key has the wrong length"))?;

        Ok(GhostRecovery { ghost_device_id, ghost_signing_keypair, user_encryption_secret })
    }

    /// Seal the ghost device's own keys for later recovery, under a key
    /// derived from `verification`, and hand the blob to the server.
    async fn seal_and_store_ghost(
        &self,
        guard: &SessionState,
        identity: &Identity,
        ghost_device_id: DeviceId,
        verification: &VerificationFactor,
    ) -> Result<(), Error> {
        let payload = VerificationKeyPayload {
            device_id: ghost_device_id.to_hex(),
            private_signature_key: base64::engine::general_purpose::STANDARD
                .encode(identity.signature_key_pair.secret_bytes()),
            private_encryption_key: base64::engine::general_purpose::STANDARD
                .encode(identity.encryption_key_pair.secret_bytes()),
        };
        let plaintext = serde_json::to_vec(&payload).map_err(|e| Error::internal(e.to_string()))?;

        let salt = generate_salt();
        let storage_key = verification.derive_storage_key(&salt)?;
        let nonce = AeadNonce::from_bytes(random::random_bytes::<24>());
        let ciphertext = aead::aead_encrypt(&storage_key, &nonce, &plaintext, b"")?;

        let mut blob = Vec::with_capacity(16 + 24 + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(nonce.as_bytes());
        blob.extend_from_slice(&ciphertext);

        guard.requester.set_verification_method(&identity.trustchain_id, &identity.user_id, &blob).await?;
        Ok(())
    }

    /// Build the second, physical-device `DeviceCreation` block authored
    /// by a ghost (or any prior device): its own signature under its
    /// fresh keypair, its delegation signed by the authoring device.
    #[allow(clippy::too_many_arguments)]
    async fn sign_real_device_block(
        &self,
        guard: &SessionState,
        trustchain_id: &TrustchainId,
        user_id: UserId,
        author_device_id: DeviceId,
        author_signing_keypair: &SigningKeyPair,
        real_signing_keypair: &SigningKeyPair,
        real_encryption_keypair: &EncryptionKeyPair,
        user_key_pair: &EncryptionKeyPair,
    ) -> Result<Block, Error> {
        let mut delegation_payload = Vec::with_capacity(64);
        delegation_payload.extend_from_slice(real_signing_keypair.public().as_bytes());
        delegation_payload.extend_from_slice(user_id.as_bytes());
        let delegation_signature = tc_crypto::sign::sign(author_signing_keypair, &delegation_payload);

        let sealed_private_user_encryption_key =
            seal::seal_encrypt(&real_encryption_keypair.public(), &user_key_pair.secret_bytes())?;

        let action = DeviceCreation {
            last_reset: None,
            ephemeral_public_signature_key: real_signing_keypair.public(),
            user_id,
            delegation_signature,
            public_signature_key: real_signing_keypair.public(),
            public_encryption_key: real_encryption_keypair.public(),
            user_key: Some(DeviceUserKey {
                public_user_encryption_key: user_key_pair.public(),
                sealed_private_user_encryption_key,
                is_ghost_device: false,
            }),
        };
        let mut block = Block {
            index: guard.next_chain_index().await,
            trustchain_id: *trustchain_id,
            action: Action::DeviceCreation(action),
            author: CryptoHash::from_bytes(*author_device_id.as_bytes()),
            signature: Signature::from_bytes([0u8; 64]),
        };
        block.signature = tc_crypto::sign::sign(real_signing_keypair, &block.signed_payload());
        Ok(block)
    }

    /// Tear down local runtime state. Always succeeds; a session that was
    /// never started just goes from `Stopped` to `Stopped`.
    pub async fn stop(&self) {
        let mut guard = self.state.lock().await;
        guard.local_user = None;
        guard.user_accessor = None;
        guard.group_accessor = None;
        guard.provisional_user_accessor = None;
        guard.local_user_accessor = None;
        guard.share_resolver = None;
        guard.key_receiver = None;
        guard.group_manager = None;
        guard.pending_identity = None;
        guard.status = Status::Stopped;
        drop(guard);
        self.events.emit(SessionEvent::SessionClosed);
    }

    /// Revoke a device, rotating the user's encryption key to every
    /// remaining device so a compromised or lost device can't decrypt
    /// anything shared afterward.
    pub async fn revoke_device(&self, device_id: DeviceId) -> Result<(), Error> {
        let mut guard = self.state.lock().await;
        guard.require_ready()?;
        let local_user = guard.local_user.as_ref().ok_or_else(|| Error::internal("missing local user"))?;
        let author_device_id = local_user.device_id;
        let author_signing_keypair_secret = *local_user.signature_keypair.secret_bytes();
        let trustchain_id = guard.trustchain_id()?;

        let (user_id, remaining_device_ids, previous_public_encryption_key) = {
            let chain = guard.chain_state.lock().await;
            let device = chain.devices.get(device_id.as_bytes()).ok_or_else(|| Error::not_found("device not found"))?;
            let user_id = device.user_id;
            let user = chain.users.get(user_id.as_bytes()).ok_or_else(|| Error::internal("owning user not found"))?;
            let remaining: Vec<_> = user.device_ids.iter().copied().filter(|id| *id != device_id).collect();
            let previous = user
                .current_public_user_encryption_key
                .ok_or_else(|| Error::precondition_failed("user has no user key to rotate"))?;
            (user_id, remaining, previous)
        };

        let new_user_key_pair = EncryptionKeyPair::generate();
        let sealed_for_previous =
            seal::seal_encrypt(&previous_public_encryption_key, &new_user_key_pair.secret_bytes())?;

        let mut sealed_user_keys_for_devices = Vec::with_capacity(remaining_device_ids.len());
        for remaining_id in &remaining_device_ids {
            let chain = guard.chain_state.lock().await;
            let device_public_key = chain
                .devices
                .get(remaining_id.as_bytes())
                .map(|d| d.public_encryption_key)
                .ok_or_else(|| Error::internal("remaining device not found in chain state"))?;
            drop(chain);
            let sealed = seal::seal_encrypt(&device_public_key, &new_user_key_pair.secret_bytes())?;
            sealed_user_keys_for_devices.push((*remaining_id, sealed));
        }

        let action = DeviceRevocation {
            target_device_id: device_id,
            user_key_rotation: Some(DeviceRevocationUserKeyRotation {
                new_public_encryption_key: new_user_key_pair.public(),
                sealed_private_encryption_key_for_previous_user_key: sealed_for_previous,
                previous_public_encryption_key,
                sealed_user_keys_for_devices,
            }),
        };
        let author_signing_keypair = SigningKeyPair::from_secret_bytes(author_signing_keypair_secret);
        let mut block = Block {
            index: guard.next_chain_index().await,
            trustchain_id,
            action: Action::DeviceRevocation(action),
            author: CryptoHash::from_bytes(*author_device_id.as_bytes()),
            signature: Signature::from_bytes([0u8; 64]),
        };
        block.signature = tc_crypto::sign::sign(&author_signing_keypair, &block.signed_payload());
        guard.push_and_apply(&block).await?;

        guard.local_store.push_local_user_key(&new_user_key_pair.public(), &new_user_key_pair.secret_bytes()).await?;

        if device_id == author_device_id {
            guard.local_user = None;
            guard.status = Status::Stopped;
            drop(guard);
            self.events.emit(SessionEvent::DeviceRevoked);
            tracing::warn!(device_id = %device_id, user_id = %user_id, "revoked own device; session stopped");
            return Ok(());
        }

        if let Some(local_user) = guard.local_user.as_mut() {
            local_user.user_keys.push(UserKeyPairEntry {
                public_encryption_key: new_user_key_pair.public(),
                private_encryption_key: Some(new_user_key_pair.secret_bytes()),
            });
        }
        tracing::info!(device_id = %device_id, user_id = %user_id, "device revoked");
        Ok(())
    }

    /// Attach a provisional identity (e.g. one an application shared a
    /// resource with before its owner had registered) to the current
    /// user, proving ownership of its address via an email verification
    /// code. Idempotent: attaching the same identity to the same user a
    /// second time just returns `Ok`. Fails with
    /// `ErrorKind::IdentityAlreadyAttached` if another user already holds
    /// it.
    pub async fn attach_provisional_identity(
        &self,
        provisional: &ProvisionalIdentity,
        verification: &VerificationFactor,
    ) -> Result<(), Error> {
        verification.validate()?;
        let (email, code) = match verification {
            VerificationFactor::EmailVerification { email, code } => (email, code),
            _ => {
                return Err(Error::invalid_argument(
                    "attaching a provisional identity requires an email verification factor",
                ))
            }
        };
        if email != &provisional.email {
            return Err(Error::invalid_argument("verification factor does not match this provisional identity's email"));
        }

        let mut guard = self.state.lock().await;
        guard.require_ready()?;
        let trustchain_id = guard.trustchain_id()?;
        let (user_id, author_device_id, author_signing_keypair_secret, recipient_user_public_encryption_key) = {
            let local_user = guard.local_user.as_ref().ok_or_else(|| Error::internal("missing local user"))?;
            let recipient_key = local_user
                .current_user_key()
                .ok_or_else(|| Error::internal("local user has no user key"))?
                .public_encryption_key;
            (local_user.user_id, local_user.device_id, *local_user.signature_keypair.secret_bytes(), recipient_key)
        };

        let app_public_signature_key = provisional.app_signature_key_pair.public();

        let secrets = guard
            .requester
            .verify_provisional_identity(&trustchain_id, email, code)
            .await?
            .ok_or_else(|| Error::not_found(format!("no provisional identity provisioned for {email}")))?;
        let tanker_signing_keypair = SigningKeyPair::from_secret_bytes(secrets.tanker_signature_secret_key);
        let tanker_encryption_keypair = EncryptionKeyPair::from_secret_bytes(secrets.tanker_encryption_secret_key);
        let tanker_public_signature_key = tanker_signing_keypair.public();

        let existing = guard
            .requester
            .get_provisional_identity_claims(&trustchain_id, &app_public_signature_key, &tanker_public_signature_key)
            .await?;
        for block in &existing {
            if let Action::ProvisionalIdentityClaim(claim) = &block.action {
                if claim.user_id == user_id {
                    tracing::info!(user_id = %user_id, email = %email, "provisional identity already attached to this user");
                    return Ok(());
                }
                return Err(Error::identity_already_attached(
                    "this provisional identity is already attached to a different user",
                ));
            }
        }

        let mut delegation_payload = Vec::with_capacity(64);
        delegation_payload.extend_from_slice(user_id.as_bytes());
        delegation_payload.extend_from_slice(recipient_user_public_encryption_key.as_bytes());
        let author_signature_by_app_key = tc_crypto::sign::sign(&provisional.app_signature_key_pair, &delegation_payload);
        let author_signature_by_tanker_key = tc_crypto::sign::sign(&tanker_signing_keypair, &delegation_payload);

        let mut unsealed_private_keys = Vec::with_capacity(64);
        unsealed_private_keys.extend_from_slice(&provisional.app_encryption_key_pair.secret_bytes());
        unsealed_private_keys.extend_from_slice(&tanker_encryption_keypair.secret_bytes());
        let sealed_private_keys = seal::seal_encrypt(&recipient_user_public_encryption_key, &unsealed_private_keys)?;

        let action = ProvisionalIdentityClaim {
            user_id,
            app_signature_public_key: app_public_signature_key,
            tanker_signature_public_key: tanker_public_signature_key,
            author_signature_by_app_key,
            author_signature_by_tanker_key,
            recipient_user_public_encryption_key,
            sealed_private_keys,
        };
        let author_signing_keypair = SigningKeyPair::from_secret_bytes(author_signing_keypair_secret);
        let mut block = Block {
            index: guard.next_chain_index().await,
            trustchain_id,
            action: Action::ProvisionalIdentityClaim(action),
            author: CryptoHash::from_bytes(*author_device_id.as_bytes()),
            signature: Signature::from_bytes([0u8; 64]),
        };
        block.signature = tc_crypto::sign::sign(&author_signing_keypair, &block.signed_payload());
        guard.push_and_apply(&block).await?;

        guard
            .local_store
            .put_provisional_user_keys(
                &app_public_signature_key,
                &tanker_public_signature_key,
                &tc_store::models::ProvisionalUserKeys {
                    app_encryption_public_key: provisional.app_encryption_key_pair.public(),
                    app_encryption_private_key: Some(provisional.app_encryption_key_pair.secret_bytes()),
                    tanker_encryption_public_key: tanker_encryption_keypair.public(),
                    tanker_encryption_private_key: Some(tanker_encryption_keypair.secret_bytes()),
                },
            )
            .await?;

        tracing::info!(user_id = %user_id, email = %email, "provisional identity attached");
        Ok(())
    }

    /// Encrypt `plaintext`, sharing the resulting resource key with
    /// `recipients` (and the author, unless `share_with_self` is false).
    pub async fn encrypt(&self, plaintext: &[u8], recipients: &Recipients) -> Result<Vec<u8>, Error> {
        let mut guard = self.state.lock().await;
        guard.require_ready()?;
        let key = tc_crypto::keys::SymmetricKey::generate();
        let opts = EncryptorOptions::default();
        let encryptor = tc_resource::dispatch(DEFAULT_ENCRYPTOR_VERSION, &opts)?;
        let encrypted = encryptor.encrypt(plaintext, &key)?;
        let resource_id = match encryptor.extract_resource_id(&encrypted)? {
            tc_proto::AnyResourceId::Simple(id) => id,
            tc_proto::AnyResourceId::Composite(id) => id.session_id(),
        };

        guard
            .local_store
            .put_resource_key(&resource_id, &tc_store::models::SymmetricKeyBytes(*key.as_bytes()))
            .await?;

        self.share_resource_key(&mut guard, &[ResourceToShare { resource_id, key: *key.as_bytes() }], recipients)
            .await?;
        Ok(encrypted)
    }

    /// Decrypt a buffer produced by `encrypt`/`share`, peeking its
    /// version tag to resolve the resource id (and, for transparent
    /// sessions, the session id) without a prior network round trip.
    /// `receive_key` is always asked for the session-level key here: the
    /// per-resource subkey derivation a composite resource needs is the
    /// encryptor's own job, done from the seed embedded in `encrypted`.
    pub async fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        let guard = self.state.lock().await;
        guard.require_ready()?;
        let key_receiver = guard.key_receiver.clone().ok_or_else(|| Error::internal("key receiver not initialized"))?;

        let version_tag =
            *encrypted.first().ok_or_else(|| Error::invalid_argument("empty buffer has no version tag"))?;
        let mut opts = EncryptorOptions::default();
        if version_tag == 9 || version_tag == 10 {
            opts.session_id = Some(tc_resource::v9::extract_session_id(encrypted)?);
        }

        let any_resource_id = tc_resource::extract_resource_id(encrypted, &opts)?;
        let key_bytes = key_receiver.receive_key(&any_resource_id, None).await?;
        let key = tc_crypto::keys::SymmetricKey::from_bytes(key_bytes);
        let encryptor = tc_resource::dispatch(version_tag, &opts)?;
        Ok(encryptor.decrypt(encrypted, &key)?)
    }

    /// Share already-encrypted resources with additional recipients.
    pub async fn share(&self, resource_ids: &[ResourceId], recipients: &Recipients) -> Result<(), Error> {
        let mut guard = self.state.lock().await;
        guard.require_ready()?;
        let mut to_share = Vec::with_capacity(resource_ids.len());
        for resource_id in resource_ids {
            let key = guard
                .local_store
                .resource_key(resource_id)
                .await?
                .ok_or_else(|| Error::not_found("resource key not held locally"))?;
            to_share.push(ResourceToShare { resource_id: *resource_id, key: key.0 });
        }
        self.share_resource_key(&mut guard, &to_share, recipients).await
    }

    async fn share_resource_key(
        &self,
        guard: &mut SessionState,
        resources: &[ResourceToShare],
        recipients: &Recipients,
    ) -> Result<(), Error> {
        let share_resolver = guard.share_resolver.clone().ok_or_else(|| Error::internal("share resolver not initialized"))?;
        let local_user = guard.local_user.as_ref().ok_or_else(|| Error::internal("missing local user"))?;
        let current_public_user_encryption_key = local_user
            .current_user_key()
            .ok_or_else(|| Error::internal("local user has no user key"))?
            .public_encryption_key;

        let mut provisional = Vec::with_capacity(recipients.emails.len());
        if !recipients.emails.is_empty() {
            let trustchain_id = guard.trustchain_id()?;
            let resolved =
                guard.requester.get_public_provisional_identities(&trustchain_id, &recipients.emails).await?;
            for (email, found) in recipients.emails.iter().zip(resolved) {
                let Some(identity) = found else {
                    return Err(Error::not_found(format!("no provisional identity for {email}")));
                };
                provisional.push(ProvisionalRecipient {
                    app_public_signature_key: identity.app_public_signature_key,
                    tanker_public_signature_key: identity.tanker_public_signature_key,
                    app_public_encryption_key: identity.app_public_encryption_key,
                    tanker_public_encryption_key: identity.tanker_public_encryption_key,
                });
            }
        }

        let author = ShareAuthorDevice {
            device_id: local_user.device_id,
            signing_keypair: &local_user.signature_keypair,
            user_id: local_user.user_id,
            current_public_user_encryption_key,
        };
        let share_recipients = ShareRecipients {
            user_ids: &recipients.user_ids,
            group_ids: &recipients.group_ids,
            provisional: &provisional,
            share_with_self: recipients.share_with_self,
        };
        let blocks = share_resolver.resolve_share(&author, resources, &share_recipients).await?;
        if blocks.is_empty() {
            return Ok(());
        }
        guard.requester.push_keys(&blocks).await?;
        Ok(())
    }

    /// Create a new internal group from known user ids.
    pub async fn create_group(&self, member_user_ids: &[UserId]) -> Result<GroupId, Error> {
        let mut guard = self.state.lock().await;
        guard.require_ready()?;
        let members = self.resolve_members(&mut guard, member_user_ids).await?;
        let (group_id, block) = {
            let local_user = guard.local_user.as_ref().ok_or_else(|| Error::internal("missing local user"))?;
            let group_manager =
                guard.group_manager.clone().ok_or_else(|| Error::internal("group manager not initialized"))?;
            let author = tc_groups::AuthorDevice { device_id: local_user.device_id, signing_keypair: &local_user.signature_keypair };
            let (block, group) = group_manager.create_group(&author, &members, &[]).await?;
            (group.group_id, block)
        };
        guard.requester.push_block(&block).await?;
        Ok(group_id)
    }

    /// Add members to an existing internal group.
    pub async fn update_group_members(&self, group_id: &GroupId, new_member_user_ids: &[UserId]) -> Result<(), Error> {
        let mut guard = self.state.lock().await;
        guard.require_ready()?;
        let members = self.resolve_members(&mut guard, new_member_user_ids).await?;
        let block = {
            let local_user = guard.local_user.as_ref().ok_or_else(|| Error::internal("missing local user"))?;
            let group_manager =
                guard.group_manager.clone().ok_or_else(|| Error::internal("group manager not initialized"))?;
            let author = tc_groups::AuthorDevice { device_id: local_user.device_id, signing_keypair: &local_user.signature_keypair };
            let (block, _group) = group_manager.update_group_members(&author, group_id, &members, &[]).await?;
            block
        };
        guard.requester.push_block(&block).await?;
        Ok(())
    }

    async fn resolve_members(&self, guard: &mut SessionState, user_ids: &[UserId]) -> Result<Vec<MemberRecipient>, Error> {
        let user_accessor = guard.user_accessor.clone().ok_or_else(|| Error::internal("user accessor not initialized"))?;
        let (users, not_found) = user_accessor.pull(user_ids).await?;
        if let Some(missing) = not_found.first() {
            return Err(Error::not_found(format!("user {missing} not found")));
        }
        users.iter().map(GroupManager::resolve_member).collect::<Result<Vec<_>, _>>().map_err(Error::from)
    }
}

struct GhostRecovery {
    ghost_device_id: DeviceId,
    ghost_signing_keypair: SigningKeyPair,
    user_encryption_secret: [u8; 32],
}

fn decode_verification_key_payload(payload: &VerificationKeyPayload) -> Result<(DeviceId, [u8; 32], [u8; 32]), Error> {
    let device_id_bytes = hex::decode(&payload.device_id)
        .map_err(|e| Error::invalid_verification(format!("invalid device id: {e}")))?;
    let device_id = DeviceId::try_from(device_id_bytes.as_slice())
        .map_err(|e| Error::invalid_verification(format!("invalid device id: {e}")))?;
    let signing_secret = decode_base64_32(&payload.private_signature_key)?;
    let encryption_secret = decode_base64_32(&payload.private_encryption_key)?;
    Ok((device_id, signing_secret, encryption_secret))
}

fn decode_base64_32(encoded: &str) -> Result<[u8; 32], Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::invalid_verification(format!("invalid key encoding: {e}")))?;
    bytes.try_into().map_err(|_| Error::invalid_verification("key must be 32 bytes"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tc_crypto::hash::generichash;
    use tc_crypto::keys::Hash;
    use tc_proto::block::TrustchainCreation;
    use tc_proto::requester::{PublicProvisionalIdentity, ProvisionalIdentitySecrets, UserStatusResult};
    use tc_proto::RequesterError;
    use tc_store::db::Db;
    use tc_store::SqliteLocalStore;

    use super::*;
    use crate::error::ErrorKind;

    /// A server fake that keeps every pushed block in memory, split the
    /// way a real server would: chain blocks, group blocks, key publishes.
    /// `user_status`/`get_user_blocks`/`get_device_blocks` all derive their
    /// answers from the same `chain`, so a `FakeServer` never drifts from
    /// what it would actually tell a client.
    #[derive(Default)]
    struct FakeServer {
        chain: StdMutex<Vec<Block>>,
        groups: StdMutex<Vec<Block>>,
        keys: StdMutex<Vec<Block>>,
        verification: StdMutex<std::collections::HashMap<[u8; 32], Vec<u8>>>,
        provisional_identities: StdMutex<std::collections::HashMap<String, ProvisionalIdentitySecrets>>,
    }

    impl FakeServer {
        fn with_genesis(genesis: Block) -> Self {
            Self { chain: StdMutex::new(vec![genesis]), ..Default::default() }
        }

        /// Simulates the out-of-band step where an embedding application
        /// provisions an identity for an address it doesn't yet know is a
        /// registered user, handing the server its tanker half.
        fn provision_provisional_identity(&self, email: &str, secrets: ProvisionalIdentitySecrets) {
            self.provisional_identities.lock().unwrap().insert(email.to_string(), secrets);
        }
    }

    fn block_user_id(block: &Block) -> Option<UserId> {
        match &block.action {
            Action::DeviceCreation(a) => Some(a.user_id),
            Action::ProvisionalIdentityClaim(a) => Some(a.user_id),
            _ => None,
        }
    }

    #[async_trait::async_trait]
    impl Requester for FakeServer {
        async fn get_blocks(&self, _: &TrustchainId, from_index: u64) -> Result<Vec<Block>, RequesterError> {
            Ok(self.chain.lock().unwrap().iter().filter(|b| b.index >= from_index).cloned().collect())
        }

        async fn push_block(&self, block: &Block) -> Result<(), RequesterError> {
            match &block.action {
                Action::UserGroupCreation(_) | Action::UserGroupAddition(_) => {
                    self.groups.lock().unwrap().push(block.clone())
                }
                _ => self.chain.lock().unwrap().push(block.clone()),
            }
            Ok(())
        }

        async fn push_keys(&self, blocks: &[Block]) -> Result<(), RequesterError> {
            self.keys.lock().unwrap().extend_from_slice(blocks);
            Ok(())
        }

        async fn get_key_publishes(
            &self,
            _: &TrustchainId,
            resource_ids: &[ResourceId],
        ) -> Result<Vec<Block>, RequesterError> {
            Ok(self
                .keys
                .lock()
                .unwrap()
                .iter()
                .filter(|b| match &b.action {
                    Action::KeyPublishToUser(kp) | Action::KeyPublishToUserGroup(kp) => {
                        resource_ids.contains(&kp.resource_id)
                    }
                    Action::KeyPublishToDevice(kp) => resource_ids.contains(&kp.resource_id),
                    Action::KeyPublishToProvisionalUser(kp) => resource_ids.contains(&kp.resource_id),
                    _ => false,
                })
                .cloned()
                .collect())
        }

        async fn user_status(
            &self,
            _: &TrustchainId,
            user_id: &UserId,
            _: &tc_crypto::keys::PublicSignatureKey,
        ) -> Result<UserStatusResult, RequesterError> {
            let user_exists = self
                .chain
                .lock()
                .unwrap()
                .iter()
                .any(|b| matches!(&b.action, Action::DeviceCreation(a) if a.user_id == *user_id));
            Ok(UserStatusResult { device_exists: user_exists, user_exists, last_reset: None })
        }

        async fn authenticate(
            &self,
            _: &TrustchainId,
            _: &UserId,
            _: &tc_crypto::SigningKeyPair,
        ) -> Result<(), RequesterError> {
            Ok(())
        }

        async fn get_user_blocks(&self, _: &TrustchainId, user_ids: &[UserId]) -> Result<Vec<Block>, RequesterError> {
            Ok(self
                .chain
                .lock()
                .unwrap()
                .iter()
                .filter(|b| block_user_id(b).map(|id| user_ids.contains(&id)).unwrap_or(false))
                .cloned()
                .collect())
        }

        async fn get_group_blocks(&self, _: &TrustchainId, _: &[GroupId]) -> Result<Vec<Block>, RequesterError> {
            Ok(self.groups.lock().unwrap().clone())
        }

        async fn get_device_blocks(&self, _: &TrustchainId, device_ids: &[DeviceId]) -> Result<Vec<Block>, RequesterError> {
            Ok(self
                .chain
                .lock()
                .unwrap()
                .iter()
                .filter(|b| device_ids.contains(&DeviceId::from_bytes(*b.hash().as_bytes())))
                .cloned()
                .collect())
        }

        async fn get_public_provisional_identities(
            &self,
            _: &TrustchainId,
            emails: &[String],
        ) -> Result<Vec<Option<PublicProvisionalIdentity>>, RequesterError> {
            Ok(emails.iter().map(|_| None).collect())
        }

        async fn set_verification_method(
            &self,
            _: &TrustchainId,
            user_id: &UserId,
            sealed_ghost_device: &[u8],
        ) -> Result<(), RequesterError> {
            self.verification.lock().unwrap().insert(*user_id.as_bytes(), sealed_ghost_device.to_vec());
            Ok(())
        }

        async fn get_verification_method(&self, _: &TrustchainId, user_id: &UserId) -> Result<Option<Vec<u8>>, RequesterError> {
            Ok(self.verification.lock().unwrap().get(user_id.as_bytes()).cloned())
        }

        async fn verify_provisional_identity(
            &self,
            _: &TrustchainId,
            email: &str,
            _verification_code: &str,
        ) -> Result<Option<ProvisionalIdentitySecrets>, RequesterError> {
            Ok(self.provisional_identities.lock().unwrap().get(email).copied())
        }

        async fn get_provisional_identity_claims(
            &self,
            _: &TrustchainId,
            app_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
            tanker_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
        ) -> Result<Vec<Block>, RequesterError> {
            Ok(self
                .chain
                .lock()
                .unwrap()
                .iter()
                .filter(|b| match &b.action {
                    Action::ProvisionalIdentityClaim(a) => {
                        &a.app_signature_public_key == app_public_signature_key
                            && &a.tanker_signature_public_key == tanker_public_signature_key
                    }
                    _ => false,
                })
                .cloned()
                .collect())
        }
    }

    /// A fresh root keypair, its signed genesis block, and a not-yet-started
    /// identity delegated by that root, the way an embedding application's
    /// backend would issue one.
    struct Fixture {
        server: Arc<FakeServer>,
        identity: Identity,
        root: SigningKeyPair,
        trustchain_id: TrustchainId,
    }

    fn identity_for(root: &SigningKeyPair, trustchain_id: TrustchainId, user_id_byte: u8) -> Identity {
        let user_id = UserId::from_bytes([user_id_byte; 32]);
        let signature_key_pair = SigningKeyPair::generate();
        let encryption_key_pair = EncryptionKeyPair::generate();
        let mut delegation_payload = Vec::with_capacity(64);
        delegation_payload.extend_from_slice(signature_key_pair.public().as_bytes());
        delegation_payload.extend_from_slice(user_id.as_bytes());
        let delegation_signature = tc_crypto::sign::sign(root, &delegation_payload);
        Identity { trustchain_id, user_id, signature_key_pair, encryption_key_pair, delegation_signature }
    }

    async fn fixture() -> Fixture {
        let root = SigningKeyPair::generate();
        let mut genesis = Block {
            index: 1,
            trustchain_id: TrustchainId::null(),
            action: Action::TrustchainCreation(TrustchainCreation { public_signature_key: root.public() }),
            author: Hash::null(),
            signature: tc_crypto::keys::Signature::from_bytes([0u8; 64]),
        };
        let trustchain_id = TrustchainId::from_bytes(*generichash(&genesis.encode()).as_bytes());
        genesis.trustchain_id = trustchain_id;

        let identity = identity_for(&root, trustchain_id, 7u8);
        Fixture { server: Arc::new(FakeServer::with_genesis(genesis)), identity, root, trustchain_id }
    }

    async fn new_session(server: Arc<FakeServer>) -> Session {
        let requester: Arc<dyn Requester> = server;
        let local_store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::new(Db::open_in_memory().await.unwrap()));
        Session::new(requester, local_store)
    }

    #[tokio::test]
    async fn fresh_identity_needs_registration() {
        let fx = fixture().await;
        let session = new_session(fx.server).await;
        let status = session.start(fx.identity).await.unwrap();
        assert_eq!(status, Status::IdentityRegistrationNeeded);
    }

    #[tokio::test]
    async fn registering_with_a_passphrase_reaches_ready() {
        let fx = fixture().await;
        let session = new_session(fx.server).await;
        session.start(fx.identity).await.unwrap();
        session.register_identity(&VerificationFactor::Passphrase("correct horse battery staple".into())).await.unwrap();
        assert_eq!(session.status().await, Status::Ready);
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_on_the_same_session_round_trips() {
        let fx = fixture().await;
        let session = new_session(fx.server).await;
        session.start(fx.identity).await.unwrap();
        session.register_identity(&VerificationFactor::Passphrase("correct horse battery staple".into())).await.unwrap();

        let plaintext = b"hold fast, let your craft be known";
        let encrypted = session.encrypt(plaintext, &Recipients::new()).await.unwrap();
        let decrypted = session.decrypt(&encrypted).await.unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn creating_a_group_with_no_members_is_rejected() {
        let fx = fixture().await;
        let session = new_session(fx.server).await;
        session.start(fx.identity).await.unwrap();
        session.register_identity(&VerificationFactor::Passphrase("correct horse battery staple".into())).await.unwrap();

        let err = session.create_group(&[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGroupSize);
    }

    #[tokio::test]
    async fn sharing_with_an_unknown_user_is_reported_as_not_found() {
        let fx = fixture().await;
        let session = new_session(fx.server).await;
        session.start(fx.identity).await.unwrap();
        session.register_identity(&VerificationFactor::Passphrase("correct horse battery staple".into())).await.unwrap();

        let unknown = UserId::from_bytes([99u8; 32]);
        let recipients = Recipients { user_ids: vec![unknown], share_with_self: false, ..Default::default() };
        let err = session.encrypt(b"secret", &recipients).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    /// A not-yet-claimed provisional identity and the secrets the server
    /// would release for it once its address is verified, the way an
    /// embedding application would issue one and a user would later prove
    /// ownership of `email`.
    struct ProvisionalFixture {
        identity: ProvisionalIdentity,
        secrets: ProvisionalIdentitySecrets,
    }

    fn provisional_identity(trustchain_id: TrustchainId, email: &str) -> ProvisionalFixture {
        let app_signature_key_pair = SigningKeyPair::generate();
        let app_encryption_key_pair = EncryptionKeyPair::generate();
        let tanker_signature_key_pair = SigningKeyPair::generate();
        let tanker_encryption_key_pair = EncryptionKeyPair::generate();
        ProvisionalFixture {
            identity: ProvisionalIdentity {
                trustchain_id,
                email: email.to_string(),
                app_signature_key_pair,
                app_encryption_key_pair,
            },
            secrets: ProvisionalIdentitySecrets {
                tanker_signature_secret_key: *tanker_signature_key_pair.secret_bytes(),
                tanker_encryption_secret_key: tanker_encryption_key_pair.secret_bytes(),
            },
        }
    }

    #[tokio::test]
    async fn attaching_a_provisional_identity_unlocks_a_resource_shared_to_it() {
        let fx = fixture().await;
        let server = fx.server.clone();
        let session = new_session(fx.server).await;
        session.start(fx.identity).await.unwrap();
        session.register_identity(&VerificationFactor::Passphrase("correct horse battery staple".into())).await.unwrap();

        let provisional = provisional_identity(fx.trustchain_id, "bob@example.com");
        server.provision_provisional_identity("bob@example.com", provisional.secrets);

        let verification = VerificationFactor::EmailVerification { email: "bob@example.com".into(), code: "123456".into() };
        session.attach_provisional_identity(&provisional.identity, &verification).await.unwrap();
        assert_eq!(session.status().await, Status::Ready);
    }

    #[tokio::test]
    async fn reattaching_the_same_provisional_identity_is_idempotent() {
        let fx = fixture().await;
        let server = fx.server.clone();
        let session = new_session(fx.server).await;
        session.start(fx.identity).await.unwrap();
        session.register_identity(&VerificationFactor::Passphrase("correct horse battery staple".into())).await.unwrap();

        let provisional = provisional_identity(fx.trustchain_id, "bob@example.com");
        server.provision_provisional_identity("bob@example.com", provisional.secrets);
        let verification = VerificationFactor::EmailVerification { email: "bob@example.com".into(), code: "123456".into() };

        session.attach_provisional_identity(&provisional.identity, &verification).await.unwrap();
        session.attach_provisional_identity(&provisional.identity, &verification).await.unwrap();
        assert_eq!(session.status().await, Status::Ready);
    }

    #[tokio::test]
    async fn attaching_a_provisional_identity_already_claimed_by_another_user_is_rejected() {
        let fx = fixture().await;
        let server = fx.server.clone();
        let alice = new_session(fx.server.clone()).await;
        alice.start(fx.identity).await.unwrap();
        alice.register_identity(&VerificationFactor::Passphrase("correct horse battery staple".into())).await.unwrap();

        let provisional = provisional_identity(fx.trustchain_id, "bob@example.com");
        server.provision_provisional_identity("bob@example.com", provisional.secrets);
        let verification = VerificationFactor::EmailVerification { email: "bob@example.com".into(), code: "123456".into() };
        alice.attach_provisional_identity(&provisional.identity, &verification).await.unwrap();

        let carol_identity = identity_for(&fx.root, fx.trustchain_id, 8u8);
        let carol = new_session(server.clone()).await;
        carol.start(carol_identity).await.unwrap();
        carol.register_identity(&VerificationFactor::Passphrase("hunter2 hunter2 hunter2".into())).await.unwrap();

        let err = carol.attach_provisional_identity(&provisional.identity, &verification).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IdentityAlreadyAttached);
    }
}
