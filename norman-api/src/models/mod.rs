mod control;
mod directory;
pub mod lenient;
mod notification;
mod registration;
mod status;

pub use control::*;
pub use directory::*;
pub use notification::*;
pub use registration::*;
pub use status::*;

use serde_json::Value;
use time::OffsetDateTime;

/// Peripheral identifier as assigned by the hub
pub type PeripheralId = u32;

/// Lowest rail position (fully closed)
pub const RAIL_MIN: u8 = 0;
/// Highest rail position (fully open)
pub const RAIL_MAX: u8 = 100;

/// Current time in Unix seconds, as sent in every `Timestamp` field.
pub fn unix_timestamp() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Task identifiers only need to differ between consecutive requests.
pub fn next_task_id() -> u32 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    (millis % 10_000) as u32
}

/// Interprets a `PeripheralUID` that the hub may send as a number or a numeric string.
pub fn parse_peripheral_id(value: &Value) -> Option<PeripheralId> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|id| PeripheralId::try_from(id).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
