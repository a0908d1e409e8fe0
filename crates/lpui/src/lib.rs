//! LinphoneUI control client.
//!
//! Talks to `lpuid` over its Unix socket:
//! - `client`: handshake, method calls and the signal stream
//! - `cli`: the `lpui` command line

pub mod cli;
pub mod client;
pub mod error;

pub use client::BusClient;
pub use error::{CtlError, Result};
