//! tc-proto — wire serialization and the trustchain block/action taxonomy.
//!
//! # Module layout
//! - `wire`      — varint/fixed/length-prefixed byte codec
//! - `ids`       — identifier newtypes (`UserId`, `DeviceId`, `GroupId`, `ResourceId`, ...)
//! - `block`     — `Nature`, `Action`, `Block`: the typed sum of on-chain actions
//! - `requester` — the `Requester` trait: the client's view of the server
//! - `error`     — unified error type

pub mod block;
pub mod error;
pub mod ids;
pub mod requester;
pub mod wire;

pub use block::{Action, Block, Nature};
pub use error::ProtoError;
pub use ids::{AnyResourceId, CompositeResourceId, DeviceId, GroupId, ResourceId, TrustchainId, UserId};
pub use requester::{PublicProvisionalIdentity, ProvisionalIdentitySecrets, Requester, RequesterError, UserStatusResult};
