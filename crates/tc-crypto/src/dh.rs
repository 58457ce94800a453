//! X25519 encryption keypairs used for Diffie-Hellman and, by `seal`,
//! for anonymous public-key encryption.

use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::CryptoError;
use crate::keys::PublicEncryptionKey;

/// A long-term or ephemeral X25519 encryption keypair.
pub struct EncryptionKeyPair {
    public: PublicEncryptionKey,
    secret: StaticSecret,
}

impl EncryptionKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public: PublicEncryptionKey::from_bytes(public.to_bytes()),
            secret,
        }
    }

    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self {
            public: PublicEncryptionKey::from_bytes(public.to_bytes()),
            secret,
        }
    }

    pub fn public(&self) -> PublicEncryptionKey {
        self.public
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Diffie-Hellman with a peer's public key.
    pub fn diffie_hellman(&self, peer: &PublicEncryptionKey) -> [u8; 32] {
        let peer_pub = PublicKey::from(*peer.as_bytes());
        self.secret.diffie_hellman(&peer_pub).to_bytes()
    }
}

impl TryFrom<&PublicEncryptionKey> for PublicKey {
    type Error = CryptoError;

    fn try_from(value: &PublicEncryptionKey) -> Result<Self, Self::Error> {
        Ok(PublicKey::from(*value.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diffie_hellman_is_symmetric() {
        let alice = EncryptionKeyPair::generate();
        let bob = EncryptionKeyPair::generate();
        assert_eq!(
            alice.diffie_hellman(&bob.public()),
            bob.diffie_hellman(&alice.public())
        );
    }
}
