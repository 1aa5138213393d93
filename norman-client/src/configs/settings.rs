use std::collections::HashMap;
use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use norman_api::{PeripheralId, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

use crate::peripheral::CoverVariant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hub {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds before a request to the hub is abandoned
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Seconds to wait before reopening a dropped notification stream
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,
    /// Seconds after which a healthy stream is reopened anyway
    #[serde(default)]
    pub periodic_reconnect: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverOverride {
    pub variant: CoverVariant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub hub: Hub,
    #[serde(default)]
    pub notification: Notification,
    /// Per-peripheral overrides keyed by peripheral id
    #[serde(default)]
    pub covers: HashMap<String, CoverOverride>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout() -> u64 {
    10
}

fn default_reconnect_interval() -> u64 {
    15
}

impl Default for Notification {
    fn default() -> Self {
        Self {
            reconnect_interval: default_reconnect_interval(),
            periodic_reconnect: None,
        }
    }
}

impl Hub {
    pub fn new<S: Into<String>>(host: S) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl Notification {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval)
    }

    pub fn periodic_reconnect(&self) -> Option<Duration> {
        self.periodic_reconnect.map(Duration::from_secs)
    }
}

impl Settings {
    /// Layers `configs/default`, `configs/{RUN_MODE}` and `NORMAN__*` environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        Config::builder()
            .add_source(File::with_name("configs/default"))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("NORMAN").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn variant_overrides(&self) -> HashMap<PeripheralId, CoverVariant> {
        self.covers
            .iter()
            .filter_map(|(id, cover)| match id.parse::<PeripheralId>() {
                Ok(id) => Some((id, cover.variant)),
                Err(_) => {
                    tracing::warn!("Ignoring cover override with invalid id {:?}", id);
                    None
                }
            })
            .collect()
    }
}
