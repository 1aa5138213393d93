use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{parse_peripheral_id, PeripheralId};

/// A state-change notice pushed by the hub on the notification stream.
///
/// The hub only tells which peripherals changed; their new state is read
/// through the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "PeripheralList", default)]
    pub peripherals: Vec<Value>,
}

impl Notification {
    /// Objects without a `PeripheralList` key are acknowledgements, not notifications.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut object) = value else {
            return None;
        };

        let peripherals = match object.remove("PeripheralList")? {
            Value::Array(items) => items,
            _ => Vec::new(),
        };

        Some(Self { peripherals })
    }

    pub fn for_peripherals(ids: impl IntoIterator<Item = PeripheralId>) -> Self {
        Self {
            peripherals: ids
                .into_iter()
                .map(|id| serde_json::json!({ "PeripheralUID": id }))
                .collect(),
        }
    }

    /// Peripherals named in the notice, in either the `{ "PeripheralUID": .. }` or bare id form.
    pub fn peripheral_ids(&self) -> Vec<PeripheralId> {
        self.peripherals
            .iter()
            .filter_map(|entry| match entry {
                Value::Object(object) => object.get("PeripheralUID").and_then(parse_peripheral_id),
                other => parse_peripheral_id(other),
            })
            .collect()
    }
}
