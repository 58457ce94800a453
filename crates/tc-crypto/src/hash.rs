//! BLAKE3-based generic hashing.
//!
//! `generichash` and `generichash_multi` are the only hashing primitives
//! the rest of the workspace is allowed to reach for — `DeviceId`
//! derivation, composite resource-ID derivation and nonce derivation in
//! `seal` all go through here so there is exactly one hash construction
//! to audit.

use crate::keys::Hash;

/// Hash a single buffer.
pub fn generichash(data: &[u8]) -> Hash {
    Hash::from_bytes(blake3::hash(data).into())
}

/// Domain-separated hash of several buffers, each length-framed so that
/// `generichash_multi(&[a, b])` cannot collide with
/// `generichash_multi(&[a || b])` for differently-split inputs.
pub fn generichash_multi(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    Hash::from_bytes(hasher.finalize().into())
}

/// Keyed hash, used where a key needs to act as a domain separator
/// (e.g. deriving an individual resource ID from a session key).
pub fn keyed_hash(key: &[u8; 32], data: &[u8]) -> Hash {
    Hash::from_bytes(blake3::keyed_hash(key, data).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generichash_is_deterministic() {
        assert_eq!(generichash(b"abc"), generichash(b"abc"));
        assert_ne!(generichash(b"abc"), generichash(b"abd"));
    }

    #[test]
    fn multi_hash_is_not_ambiguous_under_concatenation() {
        let h1 = generichash_multi(&[b"ab", b"c"]);
        let h2 = generichash_multi(&[b"a", b"bc"]);
        assert_ne!(h1, h2);
    }
}
