//! V3: whole-buffer XChaCha20-Poly1305-IETF, zero IV.
//!
//! `version(1) ‖ ciphertext ‖ mac(16)`. Safe without an explicit IV only
//! because every V3 ciphertext is encrypted under a freshly generated,
//! single-use resource key (never reused across calls) — see V2 for the
//! general case where the key may be long-lived.

use tc_crypto::aead::{aead_decrypt, aead_encrypt};
use tc_crypto::keys::{AeadNonce, SymmetricKey};
use tc_proto::ResourceId;

use crate::error::ResourceError;

pub const VERSION: u8 = 3;
const MAC_SIZE: usize = 16;
pub const OVERHEAD: u64 = 1 + MAC_SIZE as u64;

fn zero_nonce() -> AeadNonce {
    AeadNonce::from_bytes([0u8; 24])
}

pub fn encrypted_size(clear_size: u64) -> u64 {
    clear_size + OVERHEAD
}

pub fn decrypted_size(encrypted: &[u8]) -> Result<u64, ResourceError> {
    let len = encrypted.len() as u64;
    if len < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V3 overhead".into()));
    }
    Ok(len - OVERHEAD)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    if (encrypted.len() as u64) < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V3 overhead".into()));
    }
    let mac = &encrypted[encrypted.len() - MAC_SIZE..];
    Ok(ResourceId::from_bytes(mac.try_into().expect("16 bytes")))
}

pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    let ct = aead_encrypt(key, &zero_nonce(), plaintext, &[VERSION])?;
    let mut out = Vec::with_capacity(1 + ct.len());
    out.push(VERSION);
    out.extend_from_slice(&ct);
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    if encrypted.len() < 1 + MAC_SIZE {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V3 overhead".into()));
    }
    let version = encrypted[0];
    if version != VERSION {
        return Err(ResourceError::UnsupportedVersion(version));
    }
    aead_decrypt(key, &zero_nonce(), &encrypted[1..], &[VERSION]).map_err(|_| ResourceError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let key = SymmetricKey::generate();
        let plaintext = b"a short message";
        let encrypted = encrypt(plaintext, &key).unwrap();
        assert_eq!(encrypted.len() as u64, encrypted_size(plaintext.len() as u64));
        assert_eq!(decrypt(&encrypted, &key).unwrap(), plaintext);
    }

    #[test]
    fn resource_id_is_the_trailing_mac() {
        let key = SymmetricKey::generate();
        let encrypted = encrypt(b"hello", &key).unwrap();
        assert_eq!(extract_resource_id(&encrypted).unwrap().as_bytes(), &encrypted[encrypted.len() - 16..]);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = SymmetricKey::generate();
        let mut encrypted = encrypt(b"hello", &key).unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xff;
        assert!(matches!(decrypt(&encrypted, &key), Err(ResourceError::DecryptionFailed)));
    }
}
