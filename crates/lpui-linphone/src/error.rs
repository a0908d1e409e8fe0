//! Process invocation errors.

use std::time::Duration;
use thiserror::Error;

/// Why an external command produced no usable output.
///
/// Always recoverable: callers log it and treat the sample as missing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// The command did not finish in time and was killed
    #[error("{program} timed out after {}ms", .timeout.as_millis())]
    Timeout { program: String, timeout: Duration },

    /// The command ran but reported failure
    #[error("{program} exited with status {}: {stderr}", exit_label(.code))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The command could not be started (or waited on)
    #[error("failed to run {program}: {reason}")]
    SpawnFailure { program: String, reason: String },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl ProcessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
