//! The identity a session is started with.

use tc_crypto::keys::Signature;
use tc_crypto::{EncryptionKeyPair, SigningKeyPair};
use tc_proto::{TrustchainId, UserId};

/// Everything needed to recognize or bootstrap this user on a trustchain.
///
/// Issued out-of-band by whoever holds the trustchain's root signing key
/// (typically the embedding application's own backend, from a long-term
/// secret it never hands to the client): `delegation_signature` already
/// vouches for `signature_key_pair`'s binding to `user_id`, so starting a
/// session never requires the root's private key.
///
/// `signature_key_pair`/`encryption_key_pair` become this user's ghost
/// device on first registration: a recoverable device whose own private
/// keys get sealed server-side under a verification factor, rather than
/// kept only on one physical device.
pub struct Identity {
    pub trustchain_id: TrustchainId,
    pub user_id: UserId,
    pub signature_key_pair: SigningKeyPair,
    pub encryption_key_pair: EncryptionKeyPair,
    pub delegation_signature: Signature,
}

impl Identity {
    pub fn public_signature_key(&self) -> tc_crypto::keys::PublicSignatureKey {
        self.signature_key_pair.public()
    }
}

/// The app half of a provisional identity: the private keypair an
/// embedding application generates for an address (email/phone) it
/// doesn't yet know is a registered user, and hands to whoever it shares
/// resources with at that address. Attaching it to a real user requires
/// proving ownership of `email` and recovering the matching "tanker" half
/// from the server, which `Session::attach_provisional_identity` does.
pub struct ProvisionalIdentity {
    pub trustchain_id: TrustchainId,
    pub email: String,
    pub app_signature_key_pair: SigningKeyPair,
    pub app_encryption_key_pair: EncryptionKeyPair,
}
