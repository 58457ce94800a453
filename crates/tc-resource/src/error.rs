use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("encrypted buffer is malformed: {0}")]
    InvalidFormat(String),

    #[error("unsupported resource encryptor version tag {0}")]
    UnsupportedVersion(u8),

    /// Also covers a chunked stream that ends without its end-of-stream
    /// marker: spec-mandated failure mode for a truncated stream.
    #[error("decryption failed (AEAD authentication rejected the ciphertext, or the stream was truncated)")]
    DecryptionFailed,

    #[error(transparent)]
    Crypto(#[from] tc_crypto::CryptoError),
}
