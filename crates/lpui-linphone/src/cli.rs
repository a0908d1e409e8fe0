//! `linphonecsh` invocations.
//!
//! `linphonecsh` talks to a background `linphonec` started by
//! `linphonecsh init`. Each method here is one short-lived `linphonecsh`
//! process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProcessError;
use crate::runner::CommandRunner;

/// Default `linphonecsh` binary name, resolved through `PATH`.
pub const DEFAULT_BINARY: &str = "linphonecsh";

/// How to reach and drive `linphonecsh`.
///
/// Durations are in milliseconds so the struct maps directly onto the
/// `[linphone]` config table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinphoneSettings {
    /// Binary to invoke
    pub binary: String,

    /// Per-user linphone config, passed through to `init -c` unmodified
    pub config_path: PathBuf,

    /// Timeout for `status register` and `generic calls`
    pub status_timeout_ms: u64,

    /// Timeout for `dial`, `generic answer` and `generic terminate`
    pub command_timeout_ms: u64,

    /// Timeout for `init`
    pub init_timeout_ms: u64,

    /// Timeout for `exit`
    pub exit_timeout_ms: u64,

    /// Pause after `init` before the first registration check
    pub startup_settle_ms: u64,

    /// Pause between `exit` and `init` on restart
    pub restart_pause_ms: u64,
}

impl Default for LinphoneSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            config_path: default_config_path(),
            status_timeout_ms: 10_000,
            command_timeout_ms: 10_000,
            init_timeout_ms: 15_000,
            exit_timeout_ms: 5_000,
            startup_settle_ms: 3_000,
            restart_pause_ms: 2_000,
        }
    }
}

impl LinphoneSettings {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    pub fn startup_settle(&self) -> Duration {
        Duration::from_millis(self.startup_settle_ms)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }
}

/// `~/.linphonerc`, or a relative `.linphonerc` without a home directory.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".linphonerc"))
        .unwrap_or_else(|| PathBuf::from(".linphonerc"))
}

/// Typed front for the `linphonecsh` commands.
///
/// Cheap to clone; clones share the runner.
#[derive(Clone)]
pub struct LinphoneCli {
    runner: Arc<dyn CommandRunner>,
    settings: LinphoneSettings,
}

impl LinphoneCli {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: LinphoneSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &LinphoneSettings {
        &self.settings
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// `linphonecsh status register`, trimmed.
    pub async fn registration_status(&self) -> Result<String, ProcessError> {
        let out = self
            .invoke(&["status", "register"], self.settings.status_timeout())
            .await?;
        Ok(out.trim().to_string())
    }

    /// `linphonecsh generic calls`, raw.
    pub async fn calls(&self) -> Result<String, ProcessError> {
        self.invoke(&["generic", "calls"], self.settings.status_timeout())
            .await
    }

    /// `linphonecsh dial <identity>`
    pub async fn dial(&self, identity: &str) -> Result<String, ProcessError> {
        self.invoke(&["dial", identity], self.settings.command_timeout())
            .await
    }

    /// `linphonecsh generic answer`
    pub async fn answer(&self) -> Result<String, ProcessError> {
        self.invoke(&["generic", "answer"], self.settings.command_timeout())
            .await
    }

    /// `linphonecsh generic terminate`
    pub async fn terminate(&self) -> Result<String, ProcessError> {
        self.invoke(&["generic", "terminate"], self.settings.command_timeout())
            .await
    }

    /// `linphonecsh init -c <config_path>`
    pub async fn init(&self) -> Result<String, ProcessError> {
        let config = self.settings.config_path.to_string_lossy().into_owned();
        self.invoke(&["init", "-c", &config], self.settings.init_timeout())
            .await
    }

    /// `linphonecsh exit`
    pub async fn exit(&self) -> Result<String, ProcessError> {
        self.invoke(&["exit"], self.settings.exit_timeout()).await
    }

    async fn invoke(&self, args: &[&str], timeout: Duration) -> Result<String, ProcessError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        let out = self
            .runner
            .run(&self.settings.binary, &args, timeout)
            .await?;
        debug!(command = ?args, output = %out.trim(), "linphonecsh output");
        Ok(out)
    }
}
