//! The backend-facing contract: everything the rest of the workspace
//! needs from a trustchain server, abstracted behind a trait so
//! `tc-verifier`/`tc-groups`/`tc-share`/`tc-session` can be tested
//! against an in-memory fake instead of a live HTTP client.

use async_trait::async_trait;

use crate::block::Block;
use crate::ids::{DeviceId, GroupId, ResourceId, TrustchainId, UserId};

/// Outcome of a `userStatus` lookup against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStatusResult {
    pub device_exists: bool,
    pub user_exists: bool,
    pub last_reset: Option<tc_crypto::keys::Hash>,
}

/// The public half of a provisional identity's split keypair, as returned
/// by `getPublicProvisionalIdentities` for an email lookup. The app half
/// is supplied by the embedding application at share time; the tanker half
/// is this SDK's own, server-issued half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicProvisionalIdentity {
    pub app_public_signature_key: tc_crypto::keys::PublicSignatureKey,
    pub app_public_encryption_key: tc_crypto::keys::PublicEncryptionKey,
    pub tanker_public_signature_key: tc_crypto::keys::PublicSignatureKey,
    pub tanker_public_encryption_key: tc_crypto::keys::PublicEncryptionKey,
}

/// The server-held "tanker" half of a provisional identity's split
/// keypair, released once the caller proves ownership of the address the
/// identity was provisioned for (an emailed/texted verification code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionalIdentitySecrets {
    pub tanker_signature_secret_key: [u8; 32],
    pub tanker_encryption_secret_key: [u8; 32],
}

/// Everything a client needs to pull from, or push to, a trustchain
/// server. Implemented by the HTTP client in the embedding application;
/// `tc-session` depends only on this trait.
#[async_trait]
pub trait Requester: Send + Sync {
    async fn get_blocks(&self, trustchain_id: &TrustchainId, from_index: u64) -> Result<Vec<Block>, RequesterError>;

    async fn push_block(&self, block: &Block) -> Result<(), RequesterError>;

    async fn push_keys(&self, blocks: &[Block]) -> Result<(), RequesterError>;

    async fn get_key_publishes(
        &self,
        trustchain_id: &TrustchainId,
        resource_ids: &[ResourceId],
    ) -> Result<Vec<Block>, RequesterError>;

    async fn user_status(
        &self,
        trustchain_id: &TrustchainId,
        user_id: &UserId,
        public_signature_key: &tc_crypto::keys::PublicSignatureKey,
    ) -> Result<UserStatusResult, RequesterError>;

    async fn authenticate(
        &self,
        trustchain_id: &TrustchainId,
        user_id: &UserId,
        signature_keypair: &tc_crypto::SigningKeyPair,
    ) -> Result<(), RequesterError>;

    async fn get_user_blocks(&self, trustchain_id: &TrustchainId, user_ids: &[UserId]) -> Result<Vec<Block>, RequesterError>;

    async fn get_group_blocks(&self, trustchain_id: &TrustchainId, group_ids: &[GroupId]) -> Result<Vec<Block>, RequesterError>;

    async fn get_device_blocks(&self, trustchain_id: &TrustchainId, device_ids: &[DeviceId]) -> Result<Vec<Block>, RequesterError>;

    /// Resolve provisional identities by email, one result per input email
    /// (`None` when no app has ever provisioned that address). Needed by
    /// the share resolver to turn an email recipient into the pair of
    /// public encryption keys a `KeyPublishToProvisionalUser` is sealed to.
    async fn get_public_provisional_identities(
        &self,
        trustchain_id: &TrustchainId,
        emails: &[String],
    ) -> Result<Vec<Option<PublicProvisionalIdentity>>, RequesterError>;

    /// Store the sealed blob a ghost device's private keys were sealed
    /// into under a verification-factor-derived key, so a later device can
    /// recover them via `get_verification_method`. Overwrites any blob
    /// previously stored for this user.
    async fn set_verification_method(
        &self,
        trustchain_id: &TrustchainId,
        user_id: &UserId,
        sealed_ghost_device: &[u8],
    ) -> Result<(), RequesterError>;

    /// Fetch the sealed ghost-device blob set by `set_verification_method`,
    /// or `None` if this identity was never registered with one.
    async fn get_verification_method(
        &self,
        trustchain_id: &TrustchainId,
        user_id: &UserId,
    ) -> Result<Option<Vec<u8>>, RequesterError>;

    /// Prove ownership of `email` via a one-time `verification_code` and
    /// receive back the tanker half of that address's provisional
    /// identity keypair. `None` if the server never provisioned an
    /// identity for this address.
    async fn verify_provisional_identity(
        &self,
        trustchain_id: &TrustchainId,
        email: &str,
        verification_code: &str,
    ) -> Result<Option<ProvisionalIdentitySecrets>, RequesterError>;

    /// Look up any `ProvisionalIdentityClaim` blocks already on-chain for
    /// the provisional identity keyed by this app/tanker signature key
    /// pair, regardless of which user authored them. Lets a caller attach
    /// idempotently and reject a claim already attached to someone else.
    async fn get_provisional_identity_claims(
        &self,
        trustchain_id: &TrustchainId,
        app_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
        tanker_public_signature_key: &tc_crypto::keys::PublicSignatureKey,
    ) -> Result<Vec<Block>, RequesterError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RequesterError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server rejected the request: {0}")]
    Rejected(String),
    #[error("server response could not be decoded: {0}")]
    Decode(#[from] crate::error::ProtoError),
}
