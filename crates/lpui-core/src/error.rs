//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A call was requested without anyone to call
    #[error("Call identity must not be empty")]
    EmptyIdentity,

    /// A call state token outside the signal vocabulary
    #[error("Unknown call state: {value} (expected incoming, outgoing, connected or ended)")]
    UnknownCallState { value: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
