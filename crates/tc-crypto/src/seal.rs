//! Anonymous public-key "seal" encryption (libsodium `crypto_box_seal`
//! equivalent): encrypt to a recipient's X25519 public key without the
//! sender holding or revealing any long-term key of their own.
//!
//! Wire format: `ephemeral_public(32) ‖ ciphertext ‖ mac(16)` — 48 bytes
//! of overhead over the plaintext, matching the fixed sizes in the data
//! model (§3).

use crate::dh::EncryptionKeyPair;
use crate::error::CryptoError;
use crate::hash::generichash_multi;
use crate::kdf::hkdf_expand_32;
use crate::keys::{AeadNonce, PublicEncryptionKey, SymmetricKey};

const SEAL_INFO: &[u8] = b"tc-seal-v1";
const SEAL_AAD: &[u8] = b"";

fn derive_key_and_nonce(
    shared_secret: &[u8; 32],
    ephemeral_public: &PublicEncryptionKey,
    recipient_public: &PublicEncryptionKey,
) -> Result<(SymmetricKey, AeadNonce), CryptoError> {
    let key_bytes = hkdf_expand_32(shared_secret, None, SEAL_INFO)?;
    let key = SymmetricKey::from_bytes(key_bytes);
    let nonce_hash = generichash_multi(&[ephemeral_public.as_bytes(), recipient_public.as_bytes()]);
    let mut nonce_bytes = [0u8; 24];
    nonce_bytes.copy_from_slice(&nonce_hash.as_bytes()[..24]);
    Ok((key, AeadNonce::from_bytes(nonce_bytes)))
}

/// Encrypt `plaintext` so that only the holder of the private half of
/// `recipient_public` can recover it.
pub fn seal_encrypt(recipient_public: &PublicEncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EncryptionKeyPair::generate();
    let shared = ephemeral.diffie_hellman(recipient_public);
    let (key, nonce) = derive_key_and_nonce(&shared, &ephemeral.public(), recipient_public)?;

    let ciphertext = crate::aead::aead_encrypt(&key, &nonce, plaintext, SEAL_AAD)?;

    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(ephemeral.public().as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `seal_encrypt`-produced buffer with the recipient's keypair.
pub fn seal_decrypt(recipient: &EncryptionKeyPair, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < 32 + 16 {
        return Err(CryptoError::SealDecrypt);
    }
    let (ephemeral_pub_bytes, ciphertext) = sealed.split_at(32);
    let ephemeral_public = PublicEncryptionKey::try_from(ephemeral_pub_bytes)?;

    let shared = recipient.diffie_hellman(&ephemeral_public);
    let (key, nonce) = derive_key_and_nonce(&shared, &ephemeral_public, &recipient.public())
        .map_err(|_| CryptoError::SealDecrypt)?;

    crate::aead::aead_decrypt(&key, &nonce, ciphertext, SEAL_AAD).map_err(|_| CryptoError::SealDecrypt)
}

/// Overhead, in bytes, that `seal_encrypt` adds over the plaintext.
pub const SEAL_OVERHEAD: usize = 32 + 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_unseal_roundtrips() {
        let recipient = EncryptionKeyPair::generate();
        let sealed = seal_encrypt(&recipient.public(), b"shared secret key material").unwrap();
        assert_eq!(sealed.len(), "shared secret key material".len() + SEAL_OVERHEAD);
        let opened = seal_decrypt(&recipient, &sealed).unwrap();
        assert_eq!(opened, b"shared secret key material");
    }

    #[test]
    fn unseal_fails_for_wrong_recipient() {
        let recipient = EncryptionKeyPair::generate();
        let impostor = EncryptionKeyPair::generate();
        let sealed = seal_encrypt(&recipient.public(), b"top secret").unwrap();
        assert!(seal_decrypt(&impostor, &sealed).is_err());
    }

    #[test]
    fn two_seals_of_same_plaintext_differ() {
        let recipient = EncryptionKeyPair::generate();
        let a = seal_encrypt(&recipient.public(), b"same plaintext").unwrap();
        let b = seal_encrypt(&recipient.public(), b"same plaintext").unwrap();
        assert_ne!(a, b);
    }
}
