//! Cover entity backed by one Norman peripheral.
//!
//! The bottom rail is the cover position and the middle rail is the tilt, both
//! from 0 (closed) to 100 (open). Commands go to the hub through the shared
//! [`HubConnection`]; the adapter's state only changes when the hub reports it.

use std::sync::Arc;

use async_trait::async_trait;
use norman_api::{PeripheralId, RAIL_MAX, RAIL_MIN};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::connection::{HubConnection, PushListener, Subscription};
use crate::error::{Error, Result, Unsupported};
use crate::peripheral::{CoverVariant, Peripheral};

// https://developers.home-assistant.io/docs/core/entity/cover#supported-features
pub const COVER_SUPPORT_OPEN: u32 = 1;
pub const COVER_SUPPORT_CLOSE: u32 = 2;
pub const COVER_SUPPORT_SET_POSITION: u32 = 4;
pub const COVER_SUPPORT_STOP: u32 = 8;
pub const COVER_SUPPORT_OPEN_TILT: u32 = 16;
pub const COVER_SUPPORT_CLOSE_TILT: u32 = 32;
pub const COVER_SUPPORT_SET_TILT_POSITION: u32 = 128;

pub fn supported_features(variant: CoverVariant) -> u32 {
    let mut features =
        COVER_SUPPORT_OPEN | COVER_SUPPORT_CLOSE | COVER_SUPPORT_SET_POSITION | COVER_SUPPORT_STOP;

    if variant.supports_tilt() {
        features |= COVER_SUPPORT_OPEN_TILT | COVER_SUPPORT_CLOSE_TILT | COVER_SUPPORT_SET_TILT_POSITION;
    }

    features
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Position,
    Tilt,
}

/// Relative move of one axis, consumed as soon as its target is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NudgeCommand {
    pub axis: Axis,
    pub step: i32,
}

impl NudgeCommand {
    pub fn position(step: i32) -> Self {
        Self {
            axis: Axis::Position,
            step,
        }
    }

    pub fn tilt(step: i32) -> Self {
        Self {
            axis: Axis::Tilt,
            step,
        }
    }

    /// `current + step`, clamped to the rail range.
    pub fn target(&self, current: u8) -> u8 {
        let target = i64::from(current) + i64::from(self.step);
        target.clamp(i64::from(RAIL_MIN), i64::from(RAIL_MAX)) as u8
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{field} = {value} is outside 0..=100")]
struct MalformedUpdate {
    field: &'static str,
    value: i64,
}

fn rail(field: &'static str, value: Option<i64>) -> std::result::Result<Option<u8>, MalformedUpdate> {
    match value {
        None => Ok(None),
        Some(value) => u8::try_from(value)
            .ok()
            .filter(|position| *position <= RAIL_MAX)
            .map(Some)
            .ok_or(MalformedUpdate { field, value }),
    }
}

/// Hub-reported state of a cover. `None` means not reported yet, or no tilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoverState {
    pub position: Option<u8>,
    pub tilt: Option<u8>,
    pub target_position: Option<u8>,
    pub target_tilt: Option<u8>,
}

impl CoverState {
    fn from_peripheral(
        peripheral: &Peripheral,
        variant: CoverVariant,
    ) -> std::result::Result<Self, MalformedUpdate> {
        let mut state = Self {
            position: rail("BottomRailPosition", peripheral.bottom_rail_position)?,
            tilt: rail("MiddleRailPosition", peripheral.middle_rail_position)?,
            target_position: rail("TargetBottomRailPosition", peripheral.target_bottom_rail_position)?,
            target_tilt: rail("TargetMiddleRailPosition", peripheral.target_middle_rail_position)?,
        };

        if !variant.supports_tilt() {
            state.tilt = None;
            state.target_tilt = None;
        }

        Ok(state)
    }

    pub fn is_moving(&self) -> bool {
        let differs = |current: Option<u8>, target: Option<u8>| {
            matches!((current, target), (Some(current), Some(target)) if current != target)
        };

        differs(self.position, self.target_position) || differs(self.tilt, self.target_tilt)
    }

    pub fn is_opening(&self) -> bool {
        matches!((self.position, self.target_position), (Some(current), Some(target)) if target > current)
    }

    pub fn is_closing(&self) -> bool {
        matches!((self.position, self.target_position), (Some(current), Some(target)) if target < current)
    }

    /// `None` while the position is unknown.
    pub fn is_closed(&self) -> Option<bool> {
        self.position.map(|position| position == RAIL_MIN)
    }
}

/// Descriptive data of a cover, for entity and device registries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverInfo {
    pub unique_id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub suggested_area: Option<String>,
    pub sw_version: Option<String>,
    pub device_class: String,
    pub variant: CoverVariant,
    pub supported_features: u32,
    pub battery_level: Option<f64>,
}

impl CoverInfo {
    fn from_peripheral(peripheral: &Peripheral, variant: CoverVariant) -> Self {
        let name = if peripheral.name.is_empty() {
            format!("Norman Cover {}", peripheral.id)
        } else {
            peripheral.name.clone()
        };

        let model = match peripheral.module_type {
            Some(module_type) => format!("Window Covering {module_type}"),
            None => "Window Covering".to_string(),
        };

        Self {
            unique_id: peripheral.id.to_string(),
            name,
            manufacturer: "Norman".to_string(),
            model,
            suggested_area: peripheral.room_name.clone().filter(|room| !room.is_empty()),
            sw_version: peripheral.firmware_version.clone(),
            device_class: "blind".to_string(),
            variant,
            supported_features: supported_features(variant),
            battery_level: peripheral.battery_level,
        }
    }
}

struct CoverShared {
    id: PeripheralId,
    variant: CoverVariant,
    info: RwLock<CoverInfo>,
    state: RwLock<CoverState>,
}

#[async_trait]
impl PushListener for CoverShared {
    async fn on_push_update(&self, update: Peripheral) {
        if update.id != self.id {
            tracing::warn!(
                "Cover {} ignoring push update addressed to {}",
                self.id,
                update.id
            );
            return;
        }

        match CoverState::from_peripheral(&update, self.variant) {
            Ok(state) => {
                tracing::debug!("Cover {} state updated: {:?}", self.id, state);
                *self.state.write().await = state;
                *self.info.write().await = CoverInfo::from_peripheral(&update, self.variant);
            }
            Err(e) => {
                tracing::warn!("Dropping malformed push update for cover {}: {}", self.id, e);
            }
        }
    }
}

/// Cover entity for one blind, registered for push updates on the hub connection.
pub struct CoverAdapter {
    connection: Arc<HubConnection>,
    shared: Arc<CoverShared>,
    _subscription: Subscription,
}

impl CoverAdapter {
    pub fn new(connection: Arc<HubConnection>, peripheral: &Peripheral) -> Self {
        let state = CoverState::from_peripheral(peripheral, peripheral.variant).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed initial state of cover {}: {}", peripheral.id, e);
            CoverState::default()
        });

        let shared = Arc::new(CoverShared {
            id: peripheral.id,
            variant: peripheral.variant,
            info: RwLock::new(CoverInfo::from_peripheral(peripheral, peripheral.variant)),
            state: RwLock::new(state),
        });

        let subscription = connection.subscribe(peripheral.id, shared.clone());

        Self {
            connection,
            shared,
            _subscription: subscription,
        }
    }

    pub async fn attach(connection: Arc<HubConnection>, id: PeripheralId) -> Result<Self> {
        let peripheral = connection
            .peripheral(id)
            .await
            .ok_or(Error::UnknownPeripheral(id))?;

        Ok(Self::new(connection, &peripheral))
    }

    /// One adapter per peripheral the hub currently lists.
    pub async fn attach_all(connection: &Arc<HubConnection>) -> Vec<Self> {
        connection
            .peripherals()
            .await
            .iter()
            .map(|peripheral| Self::new(connection.clone(), peripheral))
            .collect()
    }

    pub fn id(&self) -> PeripheralId {
        self.shared.id
    }

    pub fn variant(&self) -> CoverVariant {
        self.shared.variant
    }

    pub async fn info(&self) -> CoverInfo {
        self.shared.info.read().await.clone()
    }

    pub async fn state(&self) -> CoverState {
        *self.shared.state.read().await
    }

    pub async fn current_position(&self) -> Option<u8> {
        self.state().await.position
    }

    pub async fn current_tilt(&self) -> Option<u8> {
        self.state().await.tilt
    }

    pub async fn is_closed(&self) -> Option<bool> {
        self.state().await.is_closed()
    }

    pub async fn is_moving(&self) -> bool {
        self.state().await.is_moving()
    }

    pub async fn is_opening(&self) -> bool {
        self.state().await.is_opening()
    }

    pub async fn is_closing(&self) -> bool {
        self.state().await.is_closing()
    }

    pub async fn available(&self) -> bool {
        self.connection.is_available(self.id()).await
    }

    /// Applies a hub-originated state report. Last writer wins.
    pub async fn on_push_update(&self, update: Peripheral) {
        self.shared.on_push_update(update).await;
    }

    pub async fn open(&self) -> Result<()> {
        self.set_position(RAIL_MAX).await
    }

    pub async fn close(&self) -> Result<()> {
        self.set_position(RAIL_MIN).await
    }

    /// Holds the blind where the hub last reported it. No-op while the position is unknown.
    pub async fn stop(&self) -> Result<()> {
        let state = self.state().await;
        let Some(current) = state.position else {
            return Ok(());
        };

        self.send_rails(Some(current), state.tilt, "stop cover").await
    }

    pub async fn set_position(&self, target: u8) -> Result<()> {
        let target = target.min(RAIL_MAX);
        let state = self.state().await;

        if state.position == Some(target) && !state.is_moving() {
            tracing::debug!("Cover {} already at position {}", self.id(), target);
            return Ok(());
        }

        self.send_rails(Some(target), None, "set position").await
    }

    pub async fn open_tilt(&self) -> Result<()> {
        self.set_tilt(RAIL_MAX).await
    }

    pub async fn close_tilt(&self) -> Result<()> {
        self.set_tilt(RAIL_MIN).await
    }

    pub async fn set_tilt(&self, target: u8) -> Result<()> {
        self.ensure_tilt()?;

        let target = target.min(RAIL_MAX);
        let state = self.state().await;

        if state.tilt == Some(target) && !state.is_moving() {
            tracing::debug!("Cover {} already at tilt {}", self.id(), target);
            return Ok(());
        }

        self.send_rails(None, Some(target), "set tilt position").await
    }

    pub async fn nudge_position(&self, step: i32) -> Result<()> {
        self.nudge(NudgeCommand::position(step)).await
    }

    pub async fn nudge_tilt(&self, step: i32) -> Result<()> {
        self.nudge(NudgeCommand::tilt(step)).await
    }

    pub async fn nudge(&self, command: NudgeCommand) -> Result<()> {
        let state = self.state().await;

        match command.axis {
            Axis::Position => {
                let current = state
                    .position
                    .ok_or(Unsupported::PositionUnknown(self.id()))?;
                self.set_position(command.target(current)).await
            }
            Axis::Tilt => {
                self.ensure_tilt()?;
                let current = state.tilt.ok_or(Unsupported::TiltUnknown(self.id()))?;
                self.set_tilt(command.target(current)).await
            }
        }
    }

    fn ensure_tilt(&self) -> Result<()> {
        if self.variant().supports_tilt() {
            Ok(())
        } else {
            Err(Unsupported::TiltNotSupported(self.id()).into())
        }
    }

    /// Rails left as `None` keep their last reported value, or fully open when unknown.
    async fn send_rails(&self, bottom: Option<u8>, middle: Option<u8>, action: &str) -> Result<()> {
        let state = self.state().await;
        let bottom = bottom.or(state.position).unwrap_or(RAIL_MAX);
        let middle = middle.or(state.tilt).unwrap_or(RAIL_MAX);

        tracing::info!(
            "Cover {}: {} (bottom {}, middle {})",
            self.id(),
            action,
            bottom,
            middle
        );

        if let Err(e) = self.connection.set_position(self.id(), bottom, middle).await {
            tracing::warn!("Failed to {} for cover {}: {}", action, self.id(), e);
            return Err(e);
        }

        Ok(())
    }
}
