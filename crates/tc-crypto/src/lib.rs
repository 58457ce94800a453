//! tc-crypto — cryptographic primitives for the trustline client SDK.
//!
//! # Design principles
//! - No custom cryptography; every primitive is a thin wrapper over an
//!   audited crate (`ed25519-dalek`, `x25519-dalek`, `chacha20poly1305`,
//!   `blake3`, `argon2`, `hkdf`).
//! - Secret material is zeroized on drop and never appears in full in a
//!   `Debug` implementation.
//! - Public APIs operate on the typed newtypes in [`keys`], never on
//!   bare byte arrays.
//!
//! # Module layout
//! - `keys`   — fixed-size typed byte wrappers (keys, hashes, MACs, signatures)
//! - `sign`   — Ed25519 signing keypairs, `sign`/`verify`
//! - `dh`     — X25519 encryption keypairs, Diffie-Hellman
//! - `seal`   — anonymous public-key "seal" encryption (48B overhead)
//! - `aead`   — explicit-nonce XChaCha20-Poly1305 AEAD
//! - `hash`   — BLAKE3 `generichash`/`generichash_multi`
//! - `kdf`    — HKDF-SHA256 and Argon2id key derivation
//! - `random` — process-wide random source
//! - `error`  — unified error type

pub mod aead;
pub mod dh;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod keys;
pub mod random;
pub mod seal;
pub mod sign;

pub use dh::EncryptionKeyPair;
pub use error::CryptoError;
pub use keys::{
    AeadNonce, Hash, Mac, PublicEncryptionKey, PublicSignatureKey, Signature, SubkeySeed,
    SymmetricKey,
};
pub use sign::SigningKeyPair;
