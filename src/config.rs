//! Relay configuration.
//!
//! Values come from an optional file and then `OUTBOX_*` environment
//! variables, which win:
//!
//! ```toml
//! worker_id = "relay-a"
//! batch_size = 50
//! lease_secs = 30
//! max_attempts = 8
//! poll_interval_ms = 500
//! retention_secs = 86400
//! ```
//!
//! Or via environment: `OUTBOX_BATCH_SIZE=50 OUTBOX_RETENTION_SECS=86400`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Lease owner id for a relay that was not given one.
///
/// Two relays must never share an id, even inside one process: a store only
/// accepts a settlement from the current lease holder.
pub(crate) fn default_worker_id() -> String {
    format!("relay-{}-{}", std::process::id(), Uuid::now_v7())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid relay config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Identity used for leases. Default: `relay-<pid>-<uuid>`, unique per
    /// instance.
    pub worker_id: String,
    /// Messages claimed per drain pass. Default: 100.
    pub batch_size: usize,
    /// Seconds a claim stays exclusive. Default: 60.
    pub lease_secs: u64,
    /// Delivery attempts before a message is dead-lettered. Default: 5.
    pub max_attempts: u32,
    /// Idle wait between polls, in milliseconds. Default: 250.
    pub poll_interval_ms: u64,
    /// Published messages older than this are purged. Default: keep forever.
    pub retention_secs: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            batch_size: 100,
            lease_secs: 60,
            max_attempts: 5,
            poll_interval_ms: 250,
            retention_secs: None,
        }
    }
}

impl RelayConfig {
    pub const ENV_PREFIX: &'static str = "OUTBOX";

    /// Load from an optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix(Self::ENV_PREFIX).try_parsing(true))
            .build()?;
        Self::finish(config)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let relay: RelayConfig = config.try_deserialize()?;
        relay.validate()?;
        Ok(relay)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_id.trim().is_empty() {
            return Err(ConfigError::Invalid("worker_id must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be greater than 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be greater than 0".into()));
        }
        if self.lease_secs == 0 {
            return Err(ConfigError::Invalid("lease_secs must be greater than 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }
}
