//! Key derivation: HKDF-SHA256 for protocol key schedules, Argon2id for
//! deriving the at-rest storage key from a device passphrase.

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// Expand `ikm` (+ optional `salt`) into `output.len()` bytes under `info`.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive a 32-byte key from `ikm` under a fixed domain-separated info string.
pub fn hkdf_expand_32(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut out = [0u8; 32];
    hkdf_expand(ikm, salt, info, &mut out)?;
    Ok(out)
}

/// 32-byte storage-at-rest key, derived once from a device passphrase.
/// Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct StorageKey(pub [u8; 32]);

fn argon2_params() -> Params {
    Params::new(64 * 1024, 3, 1, Some(32)).expect("static argon2 params are always valid")
}

/// Derive a storage key from a passphrase and a 16-byte salt (Argon2id,
/// interactive tuning: 64 MiB, 3 iterations, 1 lane).
pub fn storage_key_from_passphrase(passphrase: &[u8], salt: &[u8; 16]) -> Result<StorageKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params());
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(StorageKey(output))
}

/// Generate a fresh random 16-byte salt (store alongside the derived data;
/// it is not secret).
pub fn generate_salt() -> [u8; 16] {
    crate::random::random_bytes::<16>()
}
