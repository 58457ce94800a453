//! tc-store — local projections, SQLite-backed persistence, and the
//! pull-on-miss accessors that bridge the verifier to the network.
//!
//! # Module layout
//! - `db`         — SQLite connection pool, WAL mode, embedded migrations
//! - `models`      — in-memory projections (`User`, `Device`, `Group`, ...)
//! - `local_store` — the `LocalStore` trait + `SqliteLocalStore`
//! - `chain_state` — in-memory verified device/user projection + `VerificationContext` impl
//! - `accessors`   — `UserAccessor`, `GroupAccessor`, `ProvisionalUserAccessor`, `LocalUserAccessor`
//! - `error`       — unified error type

pub mod accessors;
pub mod chain_state;
pub mod db;
pub mod error;
pub mod local_store;
pub mod models;

pub use accessors::{GroupAccessor, LocalUserAccessor, ProvisionalUserAccessor, UserAccessor};
pub use chain_state::ChainState;
pub use db::Db;
pub use error::StoreError;
pub use local_store::{DeviceKeys, LocalStore, SqliteLocalStore};
