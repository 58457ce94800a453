use thiserror::Error;

/// Errors from the wire codec and block/action taxonomy layer.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("unexpected end of buffer while decoding {0}")]
    Truncated(&'static str),

    #[error("invalid varint encoding")]
    InvalidVarint,

    #[error("unknown block nature code {0}")]
    UnknownNature(u64),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("trailing bytes after decoding a block payload")]
    TrailingBytes,

    #[error(transparent)]
    Crypto(#[from] tc_crypto::CryptoError),
}

impl ProtoError {
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField { field, reason: reason.into() }
    }
}
