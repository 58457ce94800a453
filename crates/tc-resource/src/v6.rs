//! V6: V3 (zero-IV, MAC-derived resource id) plus plaintext padding.
//!
//! Wire shape is identical to V3; only the plaintext fed to the AEAD
//! differs (padded before encryption, unpadded after decryption).

use tc_crypto::keys::SymmetricKey;
use tc_proto::ResourceId;

use crate::error::ResourceError;
use crate::padding::{self, PaddingStep};
use crate::v3;

pub const VERSION: u8 = 6;

pub fn encrypted_size(clear_size: u64, step: PaddingStep) -> u64 {
    v3::OVERHEAD + padding::padded_size(clear_size, step)
}

pub fn decrypted_size_upper_bound(encrypted: &[u8]) -> Result<u64, ResourceError> {
    // The exact clear size isn't recoverable without decrypting (the
    // marker byte lives inside the ciphertext), so this is an upper bound.
    v3::decrypted_size(encrypted)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    v3::extract_resource_id(encrypted)
}

pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, step: PaddingStep) -> Result<Vec<u8>, ResourceError> {
    let padded = padding::pad(plaintext, step);
    let mut out = v3::encrypt(&padded, key)?;
    out[0] = VERSION;
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    if encrypted.first().copied() != Some(VERSION) {
        return Err(ResourceError::UnsupportedVersion(encrypted.first().copied().unwrap_or(0)));
    }
    let mut rewritten = encrypted.to_vec();
    rewritten[0] = v3::VERSION;
    let padded = v3::decrypt(&rewritten, key)?;
    padding::unpad(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_roundtrips_and_pads() {
        let key = SymmetricKey::generate();
        let plaintext = b"short";
        let encrypted = encrypt(plaintext, &key, PaddingStep::Auto).unwrap();
        assert!(encrypted.len() as u64 > (plaintext.len() as u64 + v3::OVERHEAD));
        assert_eq!(decrypt(&encrypted, &key).unwrap(), plaintext);
    }

    #[test]
    fn resource_id_is_still_the_trailing_mac() {
        let key = SymmetricKey::generate();
        let encrypted = encrypt(b"hello", &key, PaddingStep::Auto).unwrap();
        assert_eq!(extract_resource_id(&encrypted).unwrap().as_bytes(), &encrypted[encrypted.len() - 16..]);
    }

    #[test]
    fn wrong_version_tag_is_rejected() {
        let key = SymmetricKey::generate();
        let mut encrypted = encrypt(b"hello", &key, PaddingStep::Auto).unwrap();
        encrypted[0] = 9;
        assert!(matches!(decrypt(&encrypted, &key), Err(ResourceError::UnsupportedVersion(9))));
    }
}
