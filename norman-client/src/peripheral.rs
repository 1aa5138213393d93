use std::collections::{BTreeMap, HashMap};

use norman_api::{Directory, PeripheralId, PeripheralStatus, StatusResponse};
use serde::{Deserialize, Serialize};

/// Kind of window covering behind a peripheral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverVariant {
    /// Drape with a bottom rail (position) and a middle rail (tilt).
    /// A positive tilt step raises the middle rail, opening the vanes.
    #[default]
    SmartDrape,
    /// Roller shade. Bottom rail only.
    Shade,
}

impl CoverVariant {
    pub fn supports_tilt(self) -> bool {
        matches!(self, CoverVariant::SmartDrape)
    }
}

/// Everything the hub tells about one peripheral: directory data merged with live status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Peripheral {
    pub id: PeripheralId,
    pub name: String,
    pub variant: CoverVariant,
    pub room_id: Option<i64>,
    pub room_name: Option<String>,
    pub group_id: Option<i64>,
    pub group_name: Option<String>,
    pub module_type: Option<i64>,
    pub module_detail: Option<i64>,
    pub bottom_rail_position: Option<i64>,
    pub middle_rail_position: Option<i64>,
    pub target_bottom_rail_position: Option<i64>,
    pub target_middle_rail_position: Option<i64>,
    pub battery_level: Option<f64>,
    pub firmware_version: Option<String>,
    pub last_update: Option<String>,
}

impl Peripheral {
    /// Entry for a peripheral the status report knows about but the directory does not.
    pub fn minimal(id: PeripheralId) -> Self {
        Self {
            id,
            name: format!("Norman {id}"),
            ..Default::default()
        }
    }

    pub fn apply_status(&mut self, status: &PeripheralStatus) {
        self.bottom_rail_position = status.bottom_rail_position;
        self.middle_rail_position = status.middle_rail_position;
        self.target_bottom_rail_position = status.target_bottom_rail_position;
        self.target_middle_rail_position = status.target_middle_rail_position;
        self.battery_level = status.battery_voltage;
        self.firmware_version = status.firmware_version.clone();
        self.last_update = status.last_update();
    }
}

/// Combines the peripheral directory with a status report, keyed by peripheral id.
///
/// Entries whose `PeripheralUID` is missing or not an integer are skipped.
pub fn merge_peripherals(
    directory: Option<&Directory>,
    status: &StatusResponse,
    variants: &HashMap<PeripheralId, CoverVariant>,
) -> BTreeMap<PeripheralId, Peripheral> {
    let mut peripherals = BTreeMap::new();

    for room in directory.map(|d| d.rooms.as_slice()).unwrap_or_default() {
        for group in &room.groups {
            for entry in &group.peripherals {
                let Some(id) = entry.id() else {
                    tracing::debug!("Skipping directory entry without a valid id: {:?}", entry.uid);
                    continue;
                };

                peripherals.insert(
                    id,
                    Peripheral {
                        id,
                        name: entry
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("Norman {id}")),
                        room_id: room.id,
                        room_name: Some(room.name.clone().unwrap_or_default()),
                        group_id: group.id,
                        group_name: Some(group.name.clone().unwrap_or_default()),
                        module_type: entry.module_type,
                        module_detail: entry.module_detail,
                        ..Default::default()
                    },
                );
            }
        }
    }

    for entry in &status.peripherals {
        let Some(id) = entry.id() else {
            tracing::debug!("Skipping status entry without a valid id: {:?}", entry.uid);
            continue;
        };

        peripherals
            .entry(id)
            .or_insert_with(|| Peripheral::minimal(id))
            .apply_status(entry);
    }

    for peripheral in peripherals.values_mut() {
        peripheral.variant = variants.get(&peripheral.id).copied().unwrap_or_default();
    }

    peripherals
}
