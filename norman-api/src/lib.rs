pub mod decoder;
pub mod models;

pub use decoder::NotificationDecoder;
pub use models::*;

/// Port the hub serves its local API on
pub const DEFAULT_PORT: u16 = 10123;

pub const ENDPOINT_REGISTRATION: &str = "/NM/v1/registration";
pub const ENDPOINT_GET_ALL_PERIPHERAL: &str = "/NM/v1/GetAllPeripheral";
pub const ENDPOINT_STATUS: &str = "/NM/v1/status";
pub const ENDPOINT_CONTROL: &str = "/NM/v1/control";
pub const ENDPOINT_NOTIFICATION: &str = "/NM/v1/notification";
