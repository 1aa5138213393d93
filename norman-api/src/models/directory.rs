use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{lenient, parse_peripheral_id, PeripheralId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeripheralListRequest {
    #[serde(rename = "ThingName")]
    pub thing_name: Option<String>,
    #[serde(rename = "TaskID")]
    pub task_id: u32,
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseStatus {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply of `GetAllPeripheral`: rooms, their groups and the peripherals in each group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeripheralListResponse {
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub results: Option<Directory>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directory {
    #[serde(rename = "RoomList", default, deserialize_with = "lenient::entries")]
    pub rooms: Vec<Room>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "RoomID", default, deserialize_with = "lenient::integer")]
    pub id: Option<i64>,
    #[serde(rename = "RoomName", default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(rename = "GroupList", default, deserialize_with = "lenient::entries")]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "GroupID", default, deserialize_with = "lenient::integer")]
    pub id: Option<i64>,
    #[serde(rename = "GroupName", default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(rename = "PeripheralList", default, deserialize_with = "lenient::entries")]
    pub peripherals: Vec<PeripheralEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeripheralEntry {
    #[serde(rename = "PeripheralUID", default)]
    pub uid: Option<Value>,
    #[serde(rename = "PeripheralName", default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(rename = "ModuleType", default, deserialize_with = "lenient::integer")]
    pub module_type: Option<i64>,
    #[serde(rename = "ModuleDetail", default, deserialize_with = "lenient::integer")]
    pub module_detail: Option<i64>,
}

impl PeripheralEntry {
    pub fn id(&self) -> Option<PeripheralId> {
        self.uid.as_ref().and_then(parse_peripheral_id)
    }
}
