//! V10: V9 (transparent session, composite resource id) plus plaintext padding.

use tc_crypto::keys::SymmetricKey;
use tc_proto::{CompositeResourceId, ResourceId};

use crate::error::ResourceError;
use crate::padding::{self, PaddingStep};
use crate::v9;

pub const VERSION: u8 = 10;

pub fn encrypted_size(clear_size: u64, step: PaddingStep) -> u64 {
    v9::OVERHEAD + padding::padded_size(clear_size, step)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<CompositeResourceId, ResourceError> {
    v9::extract_resource_id(encrypted)
}

pub fn extract_session_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    v9::extract_session_id(encrypted)
}

pub fn extract_subkey_seed(encrypted: &[u8]) -> Result<[u8; 32], ResourceError> {
    v9::extract_subkey_seed(encrypted)
}

pub fn encrypt(
    plaintext: &[u8],
    session_key: &SymmetricKey,
    session_id: ResourceId,
    step: PaddingStep,
) -> Result<Vec<u8>, ResourceError> {
    let padded = padding::pad(plaintext, step);
    let mut out = v9::encrypt(&padded, session_key, session_id)?;
    out[0] = VERSION;
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], session_key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    if encrypted.first().copied() != Some(VERSION) {
        return Err(ResourceError::UnsupportedVersion(encrypted.first().copied().unwrap_or(0)));
    }
    let mut rewritten = encrypted.to_vec();
    rewritten[0] = v9::VERSION;
    let padded = v9::decrypt(&rewritten, session_key)?;
    padding::unpad(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips_and_pads() {
        let session_key = SymmetricKey::generate();
        let session_id = ResourceId::from_bytes([4u8; 16]);
        let plaintext = b"short";
        let encrypted = encrypt(plaintext, &session_key, session_id, PaddingStep::Fixed(16)).unwrap();
        assert_eq!(
            encrypted.len() as u64,
            encrypted_size(plaintext.len() as u64, PaddingStep::Fixed(16))
        );
        assert_eq!(decrypt(&encrypted, &session_key).unwrap(), plaintext);
    }

    #[test]
    fn resource_id_extraction_matches_v9() {
        let session_key = SymmetricKey::generate();
        let session_id = ResourceId::from_bytes([5u8; 16]);
        let encrypted = encrypt(b"hello", &session_key, session_id, PaddingStep::Auto).unwrap();
        let composite = extract_resource_id(&encrypted).unwrap();
        assert_eq!(composite.session_id(), session_id);
    }
}
