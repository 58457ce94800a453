//! tc-verifier — pure, no-I/O verification of trustchain blocks.
//!
//! Every rule lives in [`verify::verify_block`]; the caller (`tc-store`'s
//! accessors) supplies a [`context::VerificationContext`] snapshot of
//! whatever prior chain state a given nature needs to check against.

pub mod context;
pub mod error;
pub mod verify;

pub use context::{DeviceInfo, GroupInfo, UserInfo, VerificationContext};
pub use error::VerifyError;
pub use verify::verify_block;
