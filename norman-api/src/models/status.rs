use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{lenient, parse_peripheral_id, PeripheralId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "Error", default)]
    pub error: i64,
    #[serde(rename = "Peripherals", default, deserialize_with = "lenient::entries")]
    pub peripherals: Vec<PeripheralStatus>,
}

/// Live state of one peripheral.
///
/// Rail positions are kept as the raw integers the hub sent. Range checks happen
/// where the values are applied, so a single bad entry never fails a whole report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeripheralStatus {
    #[serde(rename = "PeripheralUID", default)]
    pub uid: Option<Value>,
    #[serde(rename = "BottomRailPosition", default, deserialize_with = "lenient::integer")]
    pub bottom_rail_position: Option<i64>,
    #[serde(rename = "MiddleRailPosition", default, deserialize_with = "lenient::integer")]
    pub middle_rail_position: Option<i64>,
    #[serde(rename = "TargetBottomRailPosition", default, deserialize_with = "lenient::integer")]
    pub target_bottom_rail_position: Option<i64>,
    #[serde(rename = "TargetMiddleRailPosition", default, deserialize_with = "lenient::integer")]
    pub target_middle_rail_position: Option<i64>,
    #[serde(rename = "BatteryVoltage", default, deserialize_with = "lenient::float")]
    pub battery_voltage: Option<f64>,
    #[serde(rename = "FirmwareVersion", default, deserialize_with = "lenient::text")]
    pub firmware_version: Option<String>,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<Value>,
}

impl PeripheralStatus {
    pub fn id(&self) -> Option<PeripheralId> {
        self.uid.as_ref().and_then(parse_peripheral_id)
    }

    /// Report time rendered as text, whatever JSON type the firmware used.
    pub fn last_update(&self) -> Option<String> {
        match self.timestamp.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}
