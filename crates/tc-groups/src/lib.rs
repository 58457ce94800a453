//! tc-groups — group creation and membership management.
//!
//! # Module layout
//! - `manager` — `GroupManager`: builds and self-signs `UserGroupCreation`/`UserGroupAddition`
//! - `error`   — unified error type

pub mod error;
pub mod manager;

pub use error::GroupsError;
pub use manager::{group_block_nature, AuthorDevice, GroupManager, MemberRecipient, ProvisionalMemberRecipient};
