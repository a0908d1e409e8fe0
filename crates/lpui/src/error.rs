//! Error types for the `lpui` client.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Client errors.
///
/// Connection errors usually mean the daemon is not running; start it
/// with `lpuid start -d`.
#[derive(Error, Debug)]
pub enum CtlError {
    /// The daemon socket could not be reached.
    #[error("Failed to connect to daemon at {path}: {reason} (is lpuid running?)")]
    Connect { path: PathBuf, reason: String },

    /// The daemon speaks an incompatible protocol version.
    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version})")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
    },

    /// The daemon answered with something the exchange did not expect.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The daemon reported an error.
    #[error("Daemon error: {0}")]
    Daemon(String),

    /// The daemon closed the connection.
    #[error("Daemon closed the connection")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_hints_at_daemon() {
        let err = CtlError::Connect {
            path: PathBuf::from("/tmp/lpui.sock"),
            reason: "No such file or directory".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/lpui.sock"));
        assert!(msg.contains("lpuid"));
    }
}
