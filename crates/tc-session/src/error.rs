//! The session's public error type. Every lower-layer error funnels
//! through here and is reclassified into one of the kinds a caller can
//! actually branch on; the original error survives as `source()`.

use std::fmt;

/// Coarse error category a caller branches on. The message carries the
/// detail; this is the part of the contract that must not change shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InternalError,
    NetworkError,
    PreconditionFailed,
    OperationCanceled,
    DecryptionFailed,
    InvalidGroupSize,
    NotFound,
    AlreadyExists,
    InvalidCredentials,
    TooManyAttempts,
    Expired,
    DeviceRevoked,
    InvalidVerification,
    IdentityAlreadyAttached,
    IOError,
}

pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    pub fn wrap(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn invalid_verification(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidVerification, message)
    }

    pub fn too_many_attempts(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TooManyAttempts, message)
    }

    pub fn identity_already_attached(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IdentityAlreadyAttached, message)
    }

    pub fn invalid_group_size(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidGroupSize, message)
    }

    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecryptionFailed, message)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error").field("kind", &self.kind).field("message", &self.message).finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<tc_crypto::CryptoError> for Error {
    fn from(e: tc_crypto::CryptoError) -> Self {
        use tc_crypto::CryptoError::*;
        let kind = match &e {
            SealDecrypt | AeadDecrypt | SignatureVerification => ErrorKind::DecryptionFailed,
            InvalidKey(_) | KeyGeneration(_) | KeyDerivation(_) | AeadEncrypt | HexDecode(_) | Base64Decode(_) => {
                ErrorKind::InternalError
            }
        };
        Self::wrap(kind, e.to_string(), e)
    }
}

impl From<tc_proto::ProtoError> for Error {
    fn from(e: tc_proto::ProtoError) -> Self {
        Self::wrap(ErrorKind::InternalError, e.to_string(), e)
    }
}

impl From<tc_verifier::VerifyError> for Error {
    fn from(e: tc_verifier::VerifyError) -> Self {
        // No local recovery is attempted on a verifier rejection: the
        // session reports it as a bad argument and keeps running.
        Self::wrap(ErrorKind::InvalidArgument, e.to_string(), e)
    }
}

impl From<tc_store::StoreError> for Error {
    fn from(e: tc_store::StoreError) -> Self {
        let kind = match &e {
            tc_store::StoreError::Verify(_) => ErrorKind::InvalidArgument,
            tc_store::StoreError::Requester(_) => ErrorKind::NetworkError,
            tc_store::StoreError::NotFound(_) => ErrorKind::NotFound,
            tc_store::StoreError::Sqlx(_) | tc_store::StoreError::Migrate(_) => ErrorKind::IOError,
            tc_store::StoreError::Proto(_) | tc_store::StoreError::Crypto(_) | tc_store::StoreError::Corrupt(_) => {
                ErrorKind::InternalError
            }
        };
        Self::wrap(kind, e.to_string(), e)
    }
}

impl From<tc_groups::GroupsError> for Error {
    fn from(e: tc_groups::GroupsError) -> Self {
        let kind = match &e {
            tc_groups::GroupsError::EmptyGroup => ErrorKind::InvalidGroupSize,
            tc_groups::GroupsError::GroupNotFound(_) => ErrorKind::NotFound,
            tc_groups::GroupsError::GroupNotInternal(_) | tc_groups::GroupsError::MemberMissingUserKey(_) => {
                ErrorKind::InvalidArgument
            }
            tc_groups::GroupsError::Crypto(_) => ErrorKind::InternalError,
            tc_groups::GroupsError::Store(_) => ErrorKind::InternalError,
        };
        Self::wrap(kind, e.to_string(), e)
    }
}

impl From<tc_share::ShareError> for Error {
    fn from(e: tc_share::ShareError) -> Self {
        let kind = match &e {
            tc_share::ShareError::Requester(_) => ErrorKind::NetworkError,
            tc_share::ShareError::Verify(_) => ErrorKind::InvalidArgument,
            tc_share::ShareError::UserNotFound(_)
            | tc_share::ShareError::GroupNotFound(_)
            | tc_share::ShareError::ProvisionalIdentityNotFound(_)
            | tc_share::ShareError::ResourceKeyNotFound(_) => ErrorKind::NotFound,
            tc_share::ShareError::CannotUnwrapKeyPublish(_) => ErrorKind::DecryptionFailed,
            tc_share::ShareError::UserMissingUserKey(_) | tc_share::ShareError::NothingToShare => {
                ErrorKind::InvalidArgument
            }
            tc_share::ShareError::Crypto(_) | tc_share::ShareError::Proto(_) => ErrorKind::InternalError,
        };
        Self::wrap(kind, e.to_string(), e)
    }
}

impl From<tc_resource::ResourceError> for Error {
    fn from(e: tc_resource::ResourceError) -> Self {
        let kind = match &e {
            tc_resource::ResourceError::DecryptionFailed => ErrorKind::DecryptionFailed,
            tc_resource::ResourceError::InvalidFormat(_) | tc_resource::ResourceError::UnsupportedVersion(_) => {
                ErrorKind::InvalidArgument
            }
            tc_resource::ResourceError::Crypto(_) => ErrorKind::InternalError,
        };
        Self::wrap(kind, e.to_string(), e)
    }
}

impl From<tc_proto::RequesterError> for Error {
    fn from(e: tc_proto::RequesterError) -> Self {
        let kind = match &e {
            tc_proto::RequesterError::Network(_) => ErrorKind::NetworkError,
            tc_proto::RequesterError::Rejected(_) => ErrorKind::PreconditionFailed,
            tc_proto::RequesterError::Decode(_) => ErrorKind::InternalError,
        };
        Self::wrap(kind, e.to_string(), e)
    }
}
