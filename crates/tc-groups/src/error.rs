use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroupsError {
    #[error("a group must have at least one member or provisional member")]
    EmptyGroup,

    #[error("member {0:?} has no current user encryption key")]
    MemberMissingUserKey(tc_proto::UserId),

    #[error("group {0:?} is not internal (its private keys are not held by this device)")]
    GroupNotInternal(tc_proto::GroupId),

    #[error("group {0:?} was not found")]
    GroupNotFound(tc_proto::GroupId),

    #[error(transparent)]
    Crypto(#[from] tc_crypto::CryptoError),

    #[error(transparent)]
    Store(#[from] tc_store::StoreError),
}
