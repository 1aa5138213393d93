use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use norman_api::PeripheralId;
use serde_json::json;

use crate::connection::{HubConnection, PushListener};
use crate::cover::CoverAdapter;
use crate::error::Result;
use crate::peripheral::Peripheral;

#[derive(Parser, Debug)]
#[command(name = "norman", version, about = "Control Norman blinds through a local hub")]
pub struct Cli {
    /// Hub address, overriding `hub.host` from the configuration
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[command(subcommand)]
    pub action: CoverAction,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CoverAction {
    /// Lists every peripheral with its current state
    List,
    /// Follows hub notifications and logs state changes until interrupted
    Watch,
    Open {
        id: PeripheralId,
    },
    Close {
        id: PeripheralId,
    },
    Stop {
        id: PeripheralId,
    },
    SetPosition {
        id: PeripheralId,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        position: u8,
    },
    SetTilt {
        id: PeripheralId,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        tilt: u8,
    },
    OpenTilt {
        id: PeripheralId,
    },
    CloseTilt {
        id: PeripheralId,
    },
    /// Moves the position by a signed step, clamped to 0..=100
    NudgePosition {
        id: PeripheralId,
        #[arg(allow_negative_numbers = true)]
        step: i32,
    },
    /// Moves the tilt by a signed step, clamped to 0..=100
    NudgeTilt {
        id: PeripheralId,
        #[arg(allow_negative_numbers = true)]
        step: i32,
    },
}

impl CoverAction {
    pub fn peripheral_id(&self) -> Option<PeripheralId> {
        match self {
            CoverAction::List | CoverAction::Watch => None,
            CoverAction::Open { id }
            | CoverAction::Close { id }
            | CoverAction::Stop { id }
            | CoverAction::SetPosition { id, .. }
            | CoverAction::SetTilt { id, .. }
            | CoverAction::OpenTilt { id }
            | CoverAction::CloseTilt { id }
            | CoverAction::NudgePosition { id, .. }
            | CoverAction::NudgeTilt { id, .. } => Some(*id),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            CoverAction::List => "list",
            CoverAction::Watch => "watch",
            CoverAction::Open { .. } => "open",
            CoverAction::Close { .. } => "close",
            CoverAction::Stop { .. } => "stop",
            CoverAction::SetPosition { .. } => "set_position",
            CoverAction::SetTilt { .. } => "set_tilt",
            CoverAction::OpenTilt { .. } => "open_tilt",
            CoverAction::CloseTilt { .. } => "close_tilt",
            CoverAction::NudgePosition { .. } => "nudge_position",
            CoverAction::NudgeTilt { .. } => "nudge_tilt",
        }
    }
}

struct StateLogger;

#[async_trait]
impl PushListener for StateLogger {
    async fn on_push_update(&self, update: Peripheral) {
        tracing::info!(
            "{} ({}): position {:?}, tilt {:?}",
            update.name,
            update.id,
            update.bottom_rail_position,
            update.middle_rail_position
        );
    }
}

/// Runs one action against the hub and describes its result as JSON.
pub async fn execute_action(
    connection: &Arc<HubConnection>,
    action: CoverAction,
) -> Result<serde_json::Value> {
    let Some(id) = action.peripheral_id() else {
        return match action {
            CoverAction::Watch => watch(connection).await,
            _ => Ok(json!(connection.peripherals().await)),
        };
    };

    let cover = CoverAdapter::attach(connection.clone(), id).await?;

    match action {
        CoverAction::Open { .. } => cover.open().await?,
        CoverAction::Close { .. } => cover.close().await?,
        CoverAction::Stop { .. } => cover.stop().await?,
        CoverAction::SetPosition { position, .. } => cover.set_position(position).await?,
        CoverAction::SetTilt { tilt, .. } => cover.set_tilt(tilt).await?,
        CoverAction::OpenTilt { .. } => cover.open_tilt().await?,
        CoverAction::CloseTilt { .. } => cover.close_tilt().await?,
        CoverAction::NudgePosition { step, .. } => cover.nudge_position(step).await?,
        CoverAction::NudgeTilt { step, .. } => cover.nudge_tilt(step).await?,
        CoverAction::List | CoverAction::Watch => {}
    }

    Ok(json!({
        "status": "sent",
        "action": action.name(),
        "peripheral": id,
        "state": cover.state().await,
    }))
}

async fn watch(connection: &Arc<HubConnection>) -> Result<serde_json::Value> {
    let peripherals = connection.peripherals().await;
    let subscriptions: Vec<_> = peripherals
        .iter()
        .map(|peripheral| connection.subscribe(peripheral.id, Arc::new(StateLogger)))
        .collect();

    let listener = connection.spawn_listener();
    tracing::info!("Watching {} peripherals, press Ctrl+C to stop", subscriptions.len());

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }

    listener.shutdown().await;
    drop(subscriptions);

    Ok(json!({ "status": "stopped", "peripherals": peripherals.len() }))
}
