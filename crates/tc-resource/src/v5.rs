//! V5: whole-buffer XChaCha20-Poly1305-IETF with an explicit, randomly
//! generated resource id (not derived from the MAC).
//!
//! `version(1) ‖ resourceId(16) ‖ iv(24) ‖ ciphertext ‖ mac(16)`.
//!
//! Needed whenever the resource id must be known *before* encryption
//! (e.g. to reserve it on the server ahead of upload) — V2/V3's
//! MAC-derived id isn't available until encryption completes.

use tc_crypto::aead::{aead_decrypt, aead_encrypt};
use tc_crypto::keys::{AeadNonce, SymmetricKey};
use tc_crypto::random::random_bytes;
use tc_proto::ResourceId;

use crate::error::ResourceError;

pub const VERSION: u8 = 5;
const RESOURCE_ID_SIZE: usize = 16;
const IV_SIZE: usize = 24;
const MAC_SIZE: usize = 16;
pub const OVERHEAD: u64 = 1 + RESOURCE_ID_SIZE as u64 + IV_SIZE as u64 + MAC_SIZE as u64;

pub fn encrypted_size(clear_size: u64) -> u64 {
    clear_size + OVERHEAD
}

pub fn decrypted_size(encrypted: &[u8]) -> Result<u64, ResourceError> {
    let len = encrypted.len() as u64;
    if len < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V5 overhead".into()));
    }
    Ok(len - OVERHEAD)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    if encrypted.len() < 1 + RESOURCE_ID_SIZE {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V5 overhead".into()));
    }
    let bytes: [u8; RESOURCE_ID_SIZE] = encrypted[1..1 + RESOURCE_ID_SIZE].try_into().expect("16 bytes");
    Ok(ResourceId::from_bytes(bytes))
}

pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    let resource_id = ResourceId::from_bytes(random_bytes::<RESOURCE_ID_SIZE>());
    encrypt_with_resource_id(plaintext, key, resource_id)
}

/// Encrypt under a caller-chosen resource id, for callers that reserved
/// the id with the server before encrypting.
pub fn encrypt_with_resource_id(
    plaintext: &[u8],
    key: &SymmetricKey,
    resource_id: ResourceId,
) -> Result<Vec<u8>, ResourceError> {
    let iv = random_bytes::<IV_SIZE>();
    let nonce = AeadNonce::from_bytes(iv);
    let mut aad = Vec::with_capacity(1 + RESOURCE_ID_SIZE);
    aad.push(VERSION);
    aad.extend_from_slice(resource_id.as_bytes());
    let ct = aead_encrypt(key, &nonce, plaintext, &aad)?;

    let mut out = Vec::with_capacity(1 + RESOURCE_ID_SIZE + IV_SIZE + ct.len());
    out.push(VERSION);
    out.extend_from_slice(resource_id.as_bytes());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ct);
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    if (encrypted.len() as u64) < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V5 overhead".into()));
    }
    let version = encrypted[0];
    if version != VERSION {
        return Err(ResourceError::UnsupportedVersion(version));
    }
    let resource_id = &encrypted[1..1 + RESOURCE_ID_SIZE];
    let iv_start = 1 + RESOURCE_ID_SIZE;
    let iv: [u8; IV_SIZE] = encrypted[iv_start..iv_start + IV_SIZE].try_into().expect("24 bytes");
    let ct = &encrypted[iv_start + IV_SIZE..];
    let nonce = AeadNonce::from_bytes(iv);

    let mut aad = Vec::with_capacity(1 + RESOURCE_ID_SIZE);
    aad.push(VERSION);
    aad.extend_from_slice(resource_id);
    aead_decrypt(key, &nonce, ct, &aad).map_err(|_| ResourceError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let key = SymmetricKey::generate();
        let plaintext = b"reserved ahead of upload";
        let encrypted = encrypt(plaintext, &key).unwrap();
        assert_eq!(encrypted.len() as u64, encrypted_size(plaintext.len() as u64));
        assert_eq!(decrypt(&encrypted, &key).unwrap(), plaintext);
    }

    #[test]
    fn resource_id_can_be_chosen_ahead_of_encryption() {
        let key = SymmetricKey::generate();
        let rid = ResourceId::from_bytes([3u8; 16]);
        let encrypted = encrypt_with_resource_id(b"hi", &key, rid).unwrap();
        assert_eq!(extract_resource_id(&encrypted).unwrap(), rid);
    }

    #[test]
    fn tampered_resource_id_is_rejected_via_aad() {
        let key = SymmetricKey::generate();
        let mut encrypted = encrypt(b"hello", &key).unwrap();
        encrypted[1] ^= 0xff;
        assert!(matches!(decrypt(&encrypted, &key), Err(ResourceError::DecryptionFailed)));
    }
}
