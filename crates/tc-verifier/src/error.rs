use thiserror::Error;

/// Categorical verification failures. Deliberately coarse — callers branch
/// on the variant, not on embedded detail, so detail lives in the
/// `Display` string rather than structured fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid delegation signature: {0}")]
    InvalidDelegationSignature(String),
    #[error("invalid author: {0}")]
    InvalidAuthor(String),
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    #[error("invalid user key: {0}")]
    InvalidUserKey(String),
    #[error("invalid user keys: {0}")]
    InvalidUserKeys(String),
    #[error("invalid target device: {0}")]
    InvalidTargetDevice(String),
    #[error("invalid user: {0}")]
    InvalidUser(String),
    #[error("invalid encryption key: {0}")]
    InvalidEncryptionKey(String),
    #[error("invalid last reset field: {0}")]
    InvalidLastResetField(String),
    #[error("invalid hash: {0}")]
    InvalidHash(String),
    #[error("invalid group: {0}")]
    InvalidGroup(String),
}
