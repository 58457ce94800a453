//! Process-wide random source.

use rand::RngCore;

/// Fill `buf` with cryptographically secure random bytes.
pub fn random_fill(buf: &mut [u8]) {
    rand::rngs::OsRng.fill_bytes(buf);
}

/// Generate `N` random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    random_fill(&mut buf);
    buf
}
