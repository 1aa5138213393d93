use serde::{Deserialize, Serialize};

use super::PeripheralId;

/// Moves both rails of one peripheral. Positions run from 0 (closed) to 100 (open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(rename = "PeripheralUID")]
    pub peripheral_id: PeripheralId,
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "TaskID")]
    pub task_id: u32,
    #[serde(rename = "BottomRailPosition")]
    pub bottom_rail_position: u8,
    #[serde(rename = "MiddleRailPosition")]
    pub middle_rail_position: u8,
}
