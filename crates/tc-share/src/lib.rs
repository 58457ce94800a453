//! tc-share — resource-key sharing and the receive-key pipeline.
//!
//! # Module layout
//! - `share`   — `ShareResolver::resolve_share`: builds signed `KeyPublish*` blocks
//! - `receive` — `KeyReceiver::receive_key`: resolves a resource id to its symmetric key
//! - `error`   — unified error type

pub mod error;
pub mod receive;
pub mod share;

pub use error::ShareError;
pub use receive::KeyReceiver;
pub use share::{AuthorDevice, ProvisionalRecipient, ResourceToShare, ShareRecipients, ShareResolver};
