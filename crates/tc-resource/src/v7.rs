//! V7: V5 (explicit random resource id) plus plaintext padding.

use tc_crypto::keys::SymmetricKey;
use tc_proto::ResourceId;

use crate::error::ResourceError;
use crate::padding::{self, PaddingStep};
use crate::v5;

pub const VERSION: u8 = 7;

pub fn encrypted_size(clear_size: u64, step: PaddingStep) -> u64 {
    v5::OVERHEAD + padding::padded_size(clear_size, step)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    v5::extract_resource_id(encrypted)
}

pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, step: PaddingStep) -> Result<Vec<u8>, ResourceError> {
    let padded = padding::pad(plaintext, step);
    let mut out = v5::encrypt(&padded, key)?;
    out[0] = VERSION;
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    if encrypted.first().copied() != Some(VERSION) {
        return Err(ResourceError::UnsupportedVersion(encrypted.first().copied().unwrap_or(0)));
    }
    let mut rewritten = encrypted.to_vec();
    rewritten[0] = v5::VERSION;
    let padded = v5::decrypt(&rewritten, key)?;
    padding::unpad(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips_and_pads() {
        let key = SymmetricKey::generate();
        let plaintext = b"short";
        let encrypted = encrypt(plaintext, &key, PaddingStep::Fixed(16)).unwrap();
        assert_eq!(encrypted.len() as u64, encrypted_size(plaintext.len() as u64, PaddingStep::Fixed(16)));
        assert_eq!(decrypt(&encrypted, &key).unwrap(), plaintext);
    }

    #[test]
    fn resource_id_extraction_matches_v5() {
        let key = SymmetricKey::generate();
        let encrypted = encrypt(b"hello", &key, PaddingStep::Auto).unwrap();
        let rid = extract_resource_id(&encrypted).unwrap();
        assert_eq!(rid.as_bytes(), &encrypted[1..17]);
    }
}
