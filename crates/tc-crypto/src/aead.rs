//! Explicit-nonce XChaCha20-Poly1305-IETF AEAD.
//!
//! The resource encryptor family (V2-V10) manages its own nonces and
//! wire framing, so this layer takes the nonce as an argument rather
//! than generating and prepending one itself (compare `seal`, which
//! owns its own framing end to end).

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};

use crate::error::CryptoError;
use crate::keys::{AeadNonce, SymmetricKey};

/// Encrypt `plaintext` under `key`/`nonce`, authenticating `aad`.
/// Returns `ciphertext || mac(16)`.
pub fn aead_encrypt(
    key: &SymmetricKey,
    nonce: &AeadNonce,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadEncrypt)?;
    cipher
        .encrypt(XNonce::from_slice(nonce.as_bytes()), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt `ciphertext` (which must include the trailing 16-byte mac)
/// under `key`/`nonce`, checking `aad`.
pub fn aead_decrypt(
    key: &SymmetricKey,
    nonce: &AeadNonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadDecrypt)?;
    cipher
        .decrypt(XNonce::from_slice(nonce.as_bytes()), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadDecrypt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::random_bytes;

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let key = SymmetricKey::generate();
        let nonce = AeadNonce::from_bytes(random_bytes::<24>());
        let ct = aead_encrypt(&key, &nonce, b"hello", b"aad").unwrap();
        let pt = aead_decrypt(&key, &nonce, &ct, b"aad").unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = SymmetricKey::generate();
        let nonce = AeadNonce::from_bytes(random_bytes::<24>());
        let mut ct = aead_encrypt(&key, &nonce, b"hello", b"aad").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        assert!(aead_decrypt(&key, &nonce, &ct, b"aad").is_err());
    }

    #[test]
    fn wrong_aad_fails_to_decrypt() {
        let key = SymmetricKey::generate();
        let nonce = AeadNonce::from_bytes(random_bytes::<24>());
        let ct = aead_encrypt(&key, &nonce, b"hello", b"aad-a").unwrap();
        assert!(aead_decrypt(&key, &nonce, &ct, b"aad-b").is_err());
    }
}
