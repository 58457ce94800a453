//! tc-session — identity lifecycle and the encrypt/decrypt/share/group
//! operations built on top of the lower trustchain crates.
//!
//! # Module layout
//! - `session`      — `Session`: the public facade
//! - `state`        — `SessionState`: lock-guarded runtime state and accessor wiring
//! - `identity`     — `Identity`: what a session is started with
//! - `verification` — `VerificationFactor`: what unlocks a ghost device on a new one
//! - `status`       — `Status`: where a session sits in its lifecycle
//! - `events`       — `SessionEvent`/`SessionEvents`: the session's broadcast channel
//! - `error`        — unified error type

mod error;
mod events;
mod identity;
mod session;
mod state;
mod status;
mod verification;

pub use error::{Error, ErrorKind};
pub use events::{SessionEvent, SessionEvents};
pub use identity::{Identity, ProvisionalIdentity};
pub use session::{Recipients, Session};
pub use status::Status;
pub use verification::{VerificationFactor, VerificationKeyPayload, MAX_VERIFICATION_ATTEMPTS};
