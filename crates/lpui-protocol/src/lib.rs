//! LinphoneUI Protocol - Bus messages and linphonecsh output parsing
//!
//! This crate provides:
//! - `parse`: total parsers turning `linphonecsh` status text into facts
//! - `sip`: user-part extraction from SIP URIs
//! - `message`: the newline-delimited JSON messages exchanged between the
//!   daemon and bus clients (method calls, replies, signals)

pub mod message;
pub mod parse;
pub mod sip;
pub mod version;

pub use message::{ClientMessage, ControlRequest, DaemonMessage, MessageType, ReplyValue};
pub use parse::{parse_call, parse_registration, PhaseVocabulary};
pub use sip::extract_identity;
pub use version::ProtocolVersion;
