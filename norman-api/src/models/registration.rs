use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Zero on success
    #[serde(rename = "Error", default)]
    pub error: i64,
    /// Hub identity required by the peripheral directory request
    #[serde(rename = "ThingName", default)]
    pub thing_name: Option<String>,
}

/// Reply shape shared by the status-less endpoints (control, acknowledgements).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Error", default)]
    pub error: i64,
}
