//! LinphoneUI Core - Call and registration state for the bridge daemon
//!
//! This crate provides the domain types shared between the daemon
//! (lpuid), the bus protocol, and the command-line client:
//! - Facts sampled from `linphonecsh` (`CallFact`, `RegistrationFact`)
//! - Durable state (`RegistrationState`, `CallRecord`)
//! - The `CallStateMachine` that turns facts into edge-triggered
//!   `NotificationEvent`s
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod call;
pub mod error;
pub mod event;
pub mod machine;
pub mod registration;

// Re-exports for convenience
pub use call::{CallFact, CallPhase, CallRecord, CallSignal, FactPhase, UNKNOWN_IDENTITY};
pub use error::{DomainError, DomainResult};
pub use event::{NotificationEvent, NotificationSink, RecordingSink};
pub use machine::CallStateMachine;
pub use registration::{RegistrationFact, RegistrationState};
