use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Proto(#[from] tc_proto::ProtoError),

    #[error(transparent)]
    Verify(#[from] tc_verifier::VerifyError),

    #[error(transparent)]
    Crypto(#[from] tc_crypto::CryptoError),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("local store row is corrupt: {0}")]
    Corrupt(String),

    #[error("requester error: {0}")]
    Requester(#[from] tc_proto::RequesterError),
}
