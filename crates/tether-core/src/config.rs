//! Runtime and launcher configuration.
//!
//! Defaults, then an optional JSON file (`TETHER_CONFIG`), then individual
//! environment overrides.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::BusName;

pub const CONFIG_PATH_ENV: &str = "TETHER_CONFIG";
pub const REGISTRATION_PREFIX_ENV: &str = "TETHER_REGISTRATION_PREFIX";
pub const RUNTIME_BUS_NAME_ENV: &str = "TETHER_RUNTIME_BUS_NAME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TetherConfig {
    /// Daemon registrations are named `<prefix>-<identity>`.
    pub registration_prefix: String,
    /// Well-known name the runtime claims on the control bus.
    pub runtime_bus_name: String,
    pub io_handoff_timeout_ms: u64,
    pub channel_wait_timeout_ms: u64,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            registration_prefix: "tether".to_owned(),
            runtime_bus_name: "org.tether.Runtime".to_owned(),
            io_handoff_timeout_ms: 2_000,
            channel_wait_timeout_ms: 5_000,
        }
    }
}

impl TetherConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` as the environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match env(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(prefix) = env(REGISTRATION_PREFIX_ENV) {
            config.registration_prefix = prefix;
        }
        if let Some(name) = env(RUNTIME_BUS_NAME_ENV) {
            config.runtime_bus_name = name;
        }
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read(path) {
            Ok(bytes) => Self::from_json(&bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registration_prefix.is_empty() {
            return Err(ConfigError::Invalid("registration_prefix is empty".into()));
        }
        if self.runtime_bus_name.is_empty() || self.runtime_bus_name.starts_with(':') {
            return Err(ConfigError::Invalid(format!(
                "runtime_bus_name {:?} is not a well-known name",
                self.runtime_bus_name
            )));
        }
        if self.io_handoff_timeout_ms == 0 || self.channel_wait_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn registration_name(&self, target: &str) -> String {
        format!("{}-{}", self.registration_prefix, target)
    }

    pub fn runtime_bus_name(&self) -> BusName {
        BusName::new(self.runtime_bus_name.clone())
    }

    pub fn io_handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.io_handoff_timeout_ms)
    }

    pub fn channel_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_wait_timeout_ms)
    }
}
