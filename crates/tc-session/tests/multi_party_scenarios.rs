//! End-to-end scenarios that exercise more than one [`tc_session::Session`]
//! against a shared in-memory server: a group share between two users, and
//! a provisional-identity attach/decrypt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tc_crypto::dh::EncryptionKeyPair;
use tc_crypto::hash::generichash;
use tc_crypto::keys::Hash;
use tc_crypto::sign::SigningKeyPair;
use tc_proto::block::{Action, Block, TrustchainCreation};
use tc_proto::requester::{PublicProvisionalIdentity, ProvisionalIdentitySecrets, UserStatusResult};
use tc_proto::{DeviceId, GroupId, Requester, RequesterError, ResourceId, TrustchainId, UserId};
use tc_session::{ErrorKind, Identity, ProvisionalIdentity, Recipients, Session, Status, VerificationFactor};
use tc_store::db::Db;
use tc_store::SqliteLocalStore;

/// A server fake that keeps every pushed block in memory, the same shape
/// a real backend would expose: chain blocks, group blocks, key publishes,
/// and the out-of-band provisioning table for email/phone verification.
#[derive(Default)]
struct FakeServer {
    chain: StdMutex<Vec<Block>>,
    groups: StdMutex<Vec<Block>>,
    keys: StdMutex<Vec<Block>>,
    verification: StdMutex<HashMap<[u8; 32], Vec<u8>>>,
    provisional_public: StdMutex<HashMap<String, PublicProvisionalIdentity>>,
    provisional_secrets: StdMutex<HashMap<String, ProvisionalIdentitySecrets>>,
}

impl FakeServer {
    fn with_genesis(genesis: Block) -> Self {
        Self { chain: StdMutex::new(vec![genesis]), ..Default::default() }
    }

    /// Simulates the out-of-band step where an embedding application
    /// provisions an identity for an address it doesn't yet know is a
    /// registered user: it hands the server the app half's public keys and
    /// the server mints and holds onto the tanker half until the address is
    /// verified.
    fn provision_provisional_identity(&self, email: &str, public: PublicProvisionalIdentity, secrets: ProvisionalIdentitySecrets) {
        self.provisional_public.lock().unwrap().insert(email.to_string(), public);
        self.provisional_secrets.lock().unwrap().insert(email.to_string(), secrets);
    }
}

fn block_user_id(block: &Block) -> Option<UserId> {
    match &block.action {
        Action::DeviceCreation(a) => Some(a.user_id),
        Action::ProvisionalIdentityClaim(a) => Some(a.user_id),
        _ => None,
    }
}

#[async_trait]
impl Requester for FakeServer {
    async fn get_blocks(&self, _: &TrustchainId, from_index: u64) -> Result<Vec<Block>, RequesterError> {
        Ok(self.chain.lock().unwrap().iter().filter(|b| b.index >= from_index).cloned().collect())
    }

    async fn push_block(&self, block: &Block) -> Result<(), RequesterError> {
        match &block.action {
            Action::UserGroupCreation(_) | Action::UserGroupAddition(_) => self.groups.lock().unwrap().push(block.clone()),
            _ => self.chain.lock().unwrap().push(block.clone()),
        }
        Ok(())
    }

    async fn push_keys(&self, blocks: &[Block]) -> Result<(), RequesterError> {
        self.keys.lock().unwrap().extend_from_slice(blocks);
        Ok(())
    }

    async fn get_key_publishes(&self, _: &TrustchainId, resource_ids: &[ResourceId]) -> Result<Vec<Block>, RequesterError> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .iter()
            .filter(|b| match &b.action {
                Action::KeyPublishToUser(kp) | Action::KeyPublishToUserGroup(kp) => resource_ids.contains(&kp.resource_id),
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
        let user_exists =
            self.chain.lock().unwrap().iter().any(|b| matches!(&b.action, Action::DeviceCreation(a) if a.user_id == *user_id));
        Ok(UserStatusResult { device_exists: user_exists, user_exists, last_reset: None })
    }

    async fn authenticate(&self, _: &TrustchainId, _: &UserId, _: &tc_crypto::SigningKeyPair) -> Result<(), RequesterError> {
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
        let table = self.provisional_public.lock().unwrap();
        Ok(emails.iter().map(|email| table.get(email).copied()).collect())
    }

    async fn set_verification_method(&self, _: &TrustchainId, user_id: &UserId, sealed_ghost_device: &[u8]) -> Result<(), RequesterError> {
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
        Ok(self.provisional_secrets.lock().unwrap().get(email).copied())
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
                    &a.app_signature_public_key == app_public_signature_key && &a.tanker_signature_public_key == tanker_public_signature_key
                }
                _ => false,
            })
            .cloned()
            .collect())
    }
}

struct World {
    server: Arc<FakeServer>,
    root: SigningKeyPair,
    trustchain_id: TrustchainId,
}

fn new_world() -> World {
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
    World { server: Arc::new(FakeServer::with_genesis(genesis)), root, trustchain_id }
}

fn identity_for(world: &World, user_id_byte: u8) -> Identity {
    let user_id = UserId::from_bytes([user_id_byte; 32]);
    let signature_key_pair = SigningKeyPair::generate();
    let encryption_key_pair = EncryptionKeyPair::generate();
    let mut delegation_payload = Vec::with_capacity(64);
    delegation_payload.extend_from_slice(signature_key_pair.public().as_bytes());
    delegation_payload.extend_from_slice(user_id.as_bytes());
    let delegation_signature = tc_crypto::sign::sign(&world.root, &delegation_payload);
    Identity { trustchain_id: world.trustchain_id, user_id, signature_key_pair, encryption_key_pair, delegation_signature }
}

async fn new_session(server: Arc<FakeServer>) -> Session {
    let requester: Arc<dyn Requester> = server;
    let local_store: Arc<dyn tc_store::LocalStore> = Arc::new(SqliteLocalStore::new(Db::open_in_memory().await.unwrap()));
    Session::new(requester, local_store)
}

async fn registered_session(world: &World, user_id_byte: u8, passphrase: &str) -> Session {
    let session = new_session(world.server.clone()).await;
    session.start(identity_for(world, user_id_byte)).await.unwrap();
    session.register_identity(&VerificationFactor::Passphrase(passphrase.into())).await.unwrap();
    session
}

#[tokio::test]
async fn group_share_is_readable_by_a_member_who_never_saw_the_key_publish_directly() {
    let world = new_world();
    let alice = registered_session(&world, 1, "correct horse battery staple").await;
    let bob = registered_session(&world, 2, "bats in the attic at midnight").await;

    let bob_user_id = UserId::from_bytes([2u8; 32]);
    let group_id = alice.create_group(&[bob_user_id]).await.unwrap();

    let plaintext = b"minutes from the group's weekly sync";
    let recipients = Recipients { group_ids: vec![group_id], share_with_self: false, ..Default::default() };
    let encrypted = alice.encrypt(plaintext, &recipients).await.unwrap();

    let decrypted = bob.decrypt(&encrypted).await.unwrap();
    assert_eq!(decrypted, plaintext);
}

#[tokio::test]
async fn attaching_a_provisional_identity_unlocks_resources_shared_before_registration() {
    let world = new_world();
    let alice = registered_session(&world, 1, "correct horse battery staple").await;

    let app_signature_key_pair = SigningKeyPair::generate();
    let app_encryption_key_pair = EncryptionKeyPair::generate();
    let tanker_signature_key_pair = SigningKeyPair::generate();
    let tanker_encryption_key_pair = EncryptionKeyPair::generate();
    let public = PublicProvisionalIdentity {
        app_public_signature_key: app_signature_key_pair.public(),
        app_public_encryption_key: app_encryption_key_pair.public(),
        tanker_public_signature_key: tanker_signature_key_pair.public(),
        tanker_public_encryption_key: tanker_encryption_key_pair.public(),
    };
    let secrets = ProvisionalIdentitySecrets {
        tanker_signature_secret_key: *tanker_signature_key_pair.secret_bytes(),
        tanker_encryption_secret_key: tanker_encryption_key_pair.secret_bytes(),
    };
    let provisional = ProvisionalIdentity {
        trustchain_id: world.trustchain_id,
        email: "bob@example.com".into(),
        app_signature_key_pair,
        app_encryption_key_pair,
    };

    let plaintext = b"invoice for services rendered in June";
    let recipients = Recipients { emails: vec!["bob@example.com".into()], share_with_self: false, ..Default::default() };
    world.server.provision_provisional_identity("bob@example.com", public, secrets);
    let encrypted = alice.encrypt(plaintext, &recipients).await.unwrap();

    let bob = registered_session(&world, 2, "bats in the attic at midnight").await;
    let verification = VerificationFactor::EmailVerification { email: "bob@example.com".into(), code: "654321".into() };
    bob.attach_provisional_identity(&provisional, &verification).await.unwrap();

    let decrypted = bob.decrypt(&encrypted).await.unwrap();
    assert_eq!(decrypted, plaintext);

    // Re-attaching the same identity is a no-op.
    bob.attach_provisional_identity(&provisional, &verification).await.unwrap();
    assert_eq!(bob.status().await, Status::Ready);

    // A different user can never claim an identity someone else already holds.
    let carol = registered_session(&world, 3, "the quick brown fox jumps").await;
    let err = carol.attach_provisional_identity(&provisional, &verification).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentityAlreadyAttached);
}
