//! LinphoneUI Linphone - `linphonecsh` CLI wrapper
//!
//! - `runner`: runs an external command with a bounded timeout and returns
//!   its stdout or a typed [`ProcessError`]
//! - `cli`: the `linphonecsh` invocations the daemon needs, built on a
//!   [`CommandRunner`]
//!
//! No parsing happens here; raw text is handed to `lpui-protocol`.

pub mod cli;
pub mod error;
pub mod runner;

pub use cli::{LinphoneCli, LinphoneSettings};
pub use error::ProcessError;
pub use runner::{CommandRunner, SystemRunner};
