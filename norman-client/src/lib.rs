use crate::cli::{execute_action, CoverAction};
use crate::configs::Settings;

pub mod cli;
pub mod configs;
pub mod connection;
pub mod cover;
pub mod error;
pub mod hub;
pub mod peripheral;

#[cfg(test)]
mod testing;

pub use connection::{ConnectionOptions, HubConnection, ListenerHandle, PushListener, Subscription};
pub use cover::{Axis, CoverAdapter, CoverInfo, CoverState, NudgeCommand};
pub use error::{Error, Result, Unsupported};
pub use hub::{HubApi, HubClient};
pub use peripheral::{CoverVariant, Peripheral};

pub async fn run(settings: &Settings, action: CoverAction) -> Result<serde_json::Value> {
    let connection = HubConnection::from_settings(settings).await?;

    tracing::info!(
        "Connected to Norman hub at {} ({} peripherals)",
        settings.hub.host,
        connection.peripherals().await.len()
    );

    execute_action(&connection, action).await
}
