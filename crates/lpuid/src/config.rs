//! Daemon configuration.
//!
//! Loaded from an optional TOML file. Every field has a default, so an
//! empty or missing file yields a working daemon. A minimal file looks like:
//!
//! ```toml
//! poll_interval_ms = 1000
//!
//! [linphone]
//! config_path = "/home/nemo/.linphonerc"
//!
//! [vocabulary]
//! active = ["StreamsRunning", "Connected", "Talking"]
//!
//! [audio]
//! route_command = ["pactl", "set-sink-port", "0", "earpiece"]
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lpui_linphone::LinphoneSettings;
use lpui_protocol::PhaseVocabulary;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::server::DEFAULT_SOCKET_PATH;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "LPUI_SOCKET";

/// Default interval between two status samples.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Full daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket the bus server listens on
    pub socket_path: PathBuf,

    /// Interval between status samples
    pub poll_interval_ms: u64,

    pub linphone: LinphoneSettings,

    /// Status tokens of `generic calls`
    pub vocabulary: PhaseVocabulary,

    pub frontend: FrontendConfig,

    pub audio: AudioConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            linphone: LinphoneSettings::default(),
            vocabulary: PhaseVocabulary::default(),
            frontend: FrontendConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

/// How to bring the front-end to the foreground on an incoming call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Program and arguments; empty disables the launch
    pub launch_command: Vec<String>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            launch_command: ["invoker", "--type=silica-qt5", "sailfish-qml", "LinphoneUI"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

/// Optional audio routing hooks.
///
/// When a command is empty the corresponding hint is only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Run when a call becomes active
    pub route_command: Vec<String>,

    /// Run when a call ends
    pub restore_command: Vec<String>,

    pub timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            route_command: Vec::new(),
            restore_command: Vec::new(),
            timeout_ms: 5_000,
        }
    }
}

impl AudioConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DaemonConfig {
    /// Loads the configuration.
    ///
    /// An explicit `path` must exist. Without one, the per-user file
    /// (`$XDG_CONFIG_HOME/lpui/lpuid.toml`) is used when present and the
    /// built-in defaults otherwise. `LPUI_SOCKET` overrides `socket_path`
    /// in all cases.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file, using defaults");
                    Self::default()
                }
            },
        };

        if let Ok(socket) = env::var(SOCKET_ENV) {
            if !socket.is_empty() {
                config.socket_path = PathBuf::from(socket);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Rejects values the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.linphone.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("linphone.binary is empty".to_string()));
        }
        if self.vocabulary.is_empty() {
            return Err(ConfigError::Invalid(
                "vocabulary defines no call status tokens".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `$XDG_CONFIG_HOME/lpui/lpuid.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lpui").join("lpuid.toml"))
}

/// Errors that can occur loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
