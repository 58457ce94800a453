use thiserror::Error;

use tc_proto::{GroupId, ResourceId, UserId};

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("user {0:?} was not found")]
    UserNotFound(UserId),

    #[error("group {0:?} was not found")]
    GroupNotFound(GroupId),

    #[error("recipient user {0:?} has no current user encryption key")]
    UserMissingUserKey(UserId),

    #[error("no email was ever provisioned for the given recipient")]
    ProvisionalIdentityNotFound(String),

    #[error("resource key for {0:?} was not found, locally or on the server")]
    ResourceKeyNotFound(ResourceId),

    #[error("key publish block for {0:?} could not be unwrapped by this device")]
    CannotUnwrapKeyPublish(ResourceId),

    #[error("sharing requires at least one resource and at least one recipient")]
    NothingToShare,

    #[error(transparent)]
    Crypto(#[from] tc_crypto::CryptoError),

    #[error(transparent)]
    Proto(#[from] tc_proto::ProtoError),

    #[error(transparent)]
    Requester(#[from] tc_proto::RequesterError),

    #[error(transparent)]
    Verify(#[from] tc_verifier::VerifyError),

    #[error(transparent)]
    Store(#[from] tc_store::StoreError),
}
