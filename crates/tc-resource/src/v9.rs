//! V9: composite (transparent session) resource ids over a V3-like frame.
//!
//! `version(1) ‖ sessionId(16) ‖ subkeySeed(32) ‖ ciphertext ‖ mac(16)`.
//!
//! A "session" lets many resources share one secret (`session_key`)
//! without ever reusing it directly: each call mints a fresh random
//! `subkeySeed` and derives a one-time `individual_key =
//! generichash(sessionKey ‖ subkeySeed)` to actually encrypt under,
//! with the zero IV that's safe precisely because that derived key is
//! single-use (same justification as V3). The resource id this produces
//! is composite: its session half is the caller-supplied `session_id`,
//! and its individual half is a public tag computed from `subkeySeed`
//! alone, so `extract_resource_id` never needs the secret key.

use tc_crypto::aead::{aead_decrypt, aead_encrypt};
use tc_crypto::hash::{generichash, generichash_multi};
use tc_crypto::keys::{AeadNonce, SymmetricKey};
use tc_proto::{CompositeResourceId, ResourceId};

use crate::error::ResourceError;

pub const VERSION: u8 = 9;
const SESSION_ID_SIZE: usize = 16;
const SUBKEY_SEED_SIZE: usize = 32;
const MAC_SIZE: usize = 16;
pub const OVERHEAD: u64 = 1 + SESSION_ID_SIZE as u64 + SUBKEY_SEED_SIZE as u64 + MAC_SIZE as u64;

fn zero_nonce() -> AeadNonce {
    AeadNonce::from_bytes([0u8; 24])
}

/// `generichash(sessionKey ‖ subkeySeed)`; the key actually used to
/// encrypt/decrypt a single resource within the session.
pub fn derive_individual_key(session_key: &SymmetricKey, subkey_seed: &[u8; 32]) -> SymmetricKey {
    let hash = generichash_multi(&[session_key.as_bytes(), subkey_seed]);
    SymmetricKey::from_bytes(*hash.as_bytes())
}

fn individual_id_from_seed(subkey_seed: &[u8; 32]) -> ResourceId {
    let hash = generichash(subkey_seed);
    let bytes: [u8; 16] = hash.as_bytes()[..16].try_into().expect("16 bytes");
    ResourceId::from_bytes(bytes)
}

pub fn encrypted_size(clear_size: u64) -> u64 {
    clear_size + OVERHEAD
}

pub fn decrypted_size(encrypted: &[u8]) -> Result<u64, ResourceError> {
    let len = encrypted.len() as u64;
    if len < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V9 overhead".into()));
    }
    Ok(len - OVERHEAD)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<CompositeResourceId, ResourceError> {
    let subkey_seed = extract_subkey_seed(encrypted)?;
    let session_id = extract_session_id(encrypted)?;
    Ok(CompositeResourceId::from_parts(session_id, individual_id_from_seed(&subkey_seed)))
}

pub fn extract_session_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    if encrypted.len() < 1 + SESSION_ID_SIZE {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V9 overhead".into()));
    }
    let bytes: [u8; SESSION_ID_SIZE] = encrypted[1..1 + SESSION_ID_SIZE].try_into().expect("16 bytes");
    Ok(ResourceId::from_bytes(bytes))
}

/// The per-resource seed a receiver needs to re-derive `individual_key`.
pub fn extract_subkey_seed(encrypted: &[u8]) -> Result<[u8; 32], ResourceError> {
    let start = 1 + SESSION_ID_SIZE;
    if (encrypted.len() as u64) < (start + SUBKEY_SEED_SIZE) as u64 {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V9 overhead".into()));
    }
    Ok(encrypted[start..start + SUBKEY_SEED_SIZE].try_into().expect("32 bytes"))
}

pub fn encrypt(
    plaintext: &[u8],
    session_key: &SymmetricKey,
    session_id: ResourceId,
) -> Result<Vec<u8>, ResourceError> {
    let subkey_seed = tc_crypto::random::random_bytes::<SUBKEY_SEED_SIZE>();
    let individual_key = derive_individual_key(session_key, &subkey_seed);

    let mut aad = Vec::with_capacity(1 + SESSION_ID_SIZE + SUBKEY_SEED_SIZE);
    aad.push(VERSION);
    aad.extend_from_slice(session_id.as_bytes());
    aad.extend_from_slice(&subkey_seed);
    let ct = aead_encrypt(&individual_key, &zero_nonce(), plaintext, &aad)?;

    let mut out = Vec::with_capacity(aad.len() + ct.len());
    out.extend_from_slice(&aad);
    out.extend_from_slice(&ct);
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], session_key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    if (encrypted.len() as u64) < OVERHEAD {
        return Err(ResourceError::InvalidFormat("buffer shorter than the V9 overhead".into()));
    }
    let version = encrypted[0];
    if version != VERSION {
        return Err(ResourceError::UnsupportedVersion(version));
    }
    let subkey_seed = extract_subkey_seed(encrypted)?;
    let individual_key = derive_individual_key(session_key, &subkey_seed);

    let body_start = 1 + SESSION_ID_SIZE + SUBKEY_SEED_SIZE;
    let aad = &encrypted[..body_start];
    let ct = &encrypted[body_start..];
    aead_decrypt(&individual_key, &zero_nonce(), ct, aad).map_err(|_| ResourceError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let session_key = SymmetricKey::generate();
        let session_id = ResourceId::from_bytes([1u8; 16]);
        let plaintext = b"one resource among many in the session";
        let encrypted = encrypt(plaintext, &session_key, session_id).unwrap();
        assert_eq!(encrypted.len() as u64, encrypted_size(plaintext.len() as u64));
        assert_eq!(decrypt(&encrypted, &session_key).unwrap(), plaintext);
    }

    #[test]
    fn resource_id_session_half_matches_caller_supplied_session_id() {
        let session_key = SymmetricKey::generate();
        let session_id = ResourceId::from_bytes([7u8; 16]);
        let encrypted = encrypt(b"hello", &session_key, session_id).unwrap();
        let composite = extract_resource_id(&encrypted).unwrap();
        assert_eq!(composite.session_id(), session_id);
        assert_eq!(composite.session_id(), extract_session_id(&encrypted).unwrap());
    }

    #[test]
    fn two_resources_in_the_same_session_share_the_session_id_but_not_the_individual_id() {
        let session_key = SymmetricKey::generate();
        let session_id = ResourceId::from_bytes([3u8; 16]);
        let a = encrypt(b"first", &session_key, session_id).unwrap();
        let b = encrypt(b"second", &session_key, session_id).unwrap();
        let ra = extract_resource_id(&a).unwrap();
        let rb = extract_resource_id(&b).unwrap();
        assert_eq!(ra.session_id(), rb.session_id());
        assert_ne!(ra.individual_id(), rb.individual_id());
    }

    #[test]
    fn tampered_subkey_seed_is_rejected() {
        let session_key = SymmetricKey::generate();
        let session_id = ResourceId::from_bytes([2u8; 16]);
        let mut encrypted = encrypt(b"hello", &session_key, session_id).unwrap();
        encrypted[1 + 16] ^= 0xff;
        assert!(matches!(decrypt(&encrypted, &session_key), Err(ResourceError::DecryptionFailed)));
    }

    #[test]
    fn wrong_session_key_is_rejected() {
        let session_id = ResourceId::from_bytes([2u8; 16]);
        let encrypted = encrypt(b"hello", &SymmetricKey::generate(), session_id).unwrap();
        assert!(matches!(decrypt(&encrypted, &SymmetricKey::generate()), Err(ResourceError::DecryptionFailed)));
    }
}
