//! V2: whole-buffer XChaCha20-Poly1305-IETF, explicit random IV.
//!
//! `version(1) ‖ iv(24) ‖ ciphertext ‖ mac(16)`. The resource id is the
//! trailing MAC, so no extra bytes are spent addressing the resource.

use tc_crypto::aead::{aead_decrypt, aead_encrypt};
use tc_crypto::keys::{AeadNonce, SymmetricKey};
use tc_crypto::random::random_bytes;
use tc_proto::ResourceId;

use crate::error::ResourceError;

pub const VERSION: u8 = 2;
const IV_SIZE: usize = 24;
const MAC_SIZE: usize = 16;
pub const OVERHEAD: u64 = 1 + IV_SIZE as u64 + MAC_SIZE as u64;

pub fn encrypted_size(clear_size: u64) -> u64 {
    clear_size + OVERHEAD
}

pub fn decrypted_size(encrypted: &[u8]) -> Result<u64, ResourceError> {
    let len = encrypted.len() as u64;
    if len < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V2 overhead".into()));
    }
    Ok(len - OVERHEAD)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    if (encrypted.len() as u64) < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V2 overhead".into()));
    }
    let mac = &encrypted[encrypted.len() - MAC_SIZE..];
    Ok(ResourceId::from_bytes(mac.try_into().expect("16 bytes")))
}

pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    let iv = random_bytes::<IV_SIZE>();
    let nonce = AeadNonce::from_bytes(iv);
    let ct = aead_encrypt(key, &nonce, plaintext, &[VERSION])?;

    let mut out = Vec::with_capacity(1 + IV_SIZE + ct.len());
    out.push(VERSION);
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ct);
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    if encrypted.len() < 1 + IV_SIZE + MAC_SIZE {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V2 overhead".into()));
    }
    let version = encrypted[0];
    if version != VERSION {
        return Err(ResourceError::UnsupportedVersion(version));
    }
    let iv: [u8; IV_SIZE] = encrypted[1..1 + IV_SIZE].try_into().expect("24 bytes");
    let ct = &encrypted[1 + IV_SIZE..];
    let nonce = AeadNonce::from_bytes(iv);
    aead_decrypt(key, &nonce, ct, &[VERSION]).map_err(|_| ResourceError::DecryptionFailed)
}
