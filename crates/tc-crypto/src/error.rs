use thiserror::Error;

/// Errors produced by the cryptographic primitives layer.
///
/// These are never swallowed: callers one layer up (verifier, store,
/// session) fold them into their own error types while preserving this
/// as the `source()`.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    AeadDecrypt,

    #[error("seal decryption failed (authentication tag mismatch or wrong recipient key)")]
    SealDecrypt,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
