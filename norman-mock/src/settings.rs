use std::error::Error;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    /// Zero binds an ephemeral port
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motor {
    /// Rail units moved per tick, zero moves instantly
    pub step: u8,
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hub {
    pub thing_name: String,
    pub motor: Motor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blind {
    pub id: u32,
    pub name: String,
    pub room: String,
    pub group: String,
    #[serde(default = "default_module_type")]
    pub module_type: i64,
    pub bottom: u8,
    pub middle: u8,
    #[serde(default = "default_battery_voltage")]
    pub battery_voltage: f64,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub server: Server,
    pub hub: Hub,
    #[serde(default)]
    pub blinds: Vec<Blind>,
}

fn default_module_type() -> i64 {
    1
}

fn default_battery_voltage() -> f64 {
    12.0
}

fn default_firmware_version() -> String {
    "1.0.0".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        Ok(toml::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../",
            "configs/mock.toml"
        )))?)
    }
}
