//! Ed25519 signing keypairs and the `sign`/`verify` primitives.

use ed25519_dalek::{Signer, SigningKey, Verifier as _, VerifyingKey};
use rand_core::OsRng;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::keys::{PublicSignatureKey, Signature};

/// A long-term or ephemeral Ed25519 signing keypair. Secret bytes are
/// zeroized on drop; only the public half survives a `Debug` print.
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)]
    public: PublicSignatureKey,
    secret_bytes: [u8; 32],
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public: PublicSignatureKey::from_bytes(signing_key.verifying_key().to_bytes()),
            secret_bytes: signing_key.to_bytes(),
        }
    }

    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        Self {
            public: PublicSignatureKey::from_bytes(signing_key.verifying_key().to_bytes()),
            secret_bytes: secret,
        }
    }

    pub fn public(&self) -> PublicSignatureKey {
        self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        sign(self, message)
    }
}

/// Sign `message` with `keypair`'s secret key.
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature::from_bytes(sig.to_bytes())
}

/// Verify `signature` over `message` under `public`.
pub fn verify(
    public: &PublicSignatureKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::SignatureVerification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"hello world");
        assert!(verify(&kp.public(), b"hello world", &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"hello world");
        assert!(verify(&kp.public(), b"goodbye world", &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let sig = kp.sign(b"hello world");
        assert!(verify(&other.public(), b"hello world", &sig).is_err());
    }

    #[test]
    fn roundtrip_from_secret_bytes() {
        let kp = SigningKeyPair::generate();
        let restored = SigningKeyPair::from_secret_bytes(*kp.secret_bytes());
        assert_eq!(kp.public(), restored.public());
    }
}
