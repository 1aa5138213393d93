use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use norman_api::*;
use tokio::sync::broadcast;

use crate::settings::{Blind, Hub, Motor};
use crate::simulate::step_towards;

/// Error code the mock answers a control request for an unknown peripheral with.
pub const ERROR_UNKNOWN_PERIPHERAL: i64 = 4;

#[derive(Debug, Clone)]
struct MockBlind {
    settings: Blind,
    bottom: u8,
    middle: u8,
    target_bottom: u8,
    target_middle: u8,
}

impl MockBlind {
    fn is_moving(&self) -> bool {
        self.bottom != self.target_bottom || self.middle != self.target_middle
    }

    fn status(&self) -> PeripheralStatus {
        PeripheralStatus {
            uid: Some(self.settings.id.into()),
            bottom_rail_position: Some(self.bottom.into()),
            middle_rail_position: Some(self.middle.into()),
            target_bottom_rail_position: Some(self.target_bottom.into()),
            target_middle_rail_position: Some(self.target_middle.into()),
            battery_voltage: Some(self.settings.battery_voltage),
            firmware_version: Some(self.settings.firmware_version.clone()),
            timestamp: Some(unix_timestamp().into()),
        }
    }
}

struct Inner {
    thing_name: String,
    motor: Motor,
    blinds: Mutex<BTreeMap<PeripheralId, MockBlind>>,
    controls: AtomicUsize,
    error_code: AtomicI64,
    notifier: broadcast::Sender<Notification>,
}

/// Simulated hub state shared by the HTTP handlers and the motor tasks.
#[derive(Clone)]
pub struct MockHub {
    inner: Arc<Inner>,
}

impl MockHub {
    pub fn new(hub: &Hub, blinds: &[Blind]) -> Self {
        let blinds = blinds
            .iter()
            .map(|blind| {
                let bottom = blind.bottom.min(RAIL_MAX);
                let middle = blind.middle.min(RAIL_MAX);

                let state = MockBlind {
                    settings: blind.clone(),
                    bottom,
                    middle,
                    target_bottom: bottom,
                    target_middle: middle,
                };

                (blind.id, state)
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                thing_name: hub.thing_name.clone(),
                motor: hub.motor.clone(),
                blinds: Mutex::new(blinds),
                controls: AtomicUsize::new(0),
                error_code: AtomicI64::new(0),
                notifier: broadcast::channel(64).0,
            }),
        }
    }

    fn blinds(&self) -> MutexGuard<'_, BTreeMap<PeripheralId, MockBlind>> {
        self.inner.blinds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn thing_name(&self) -> &str {
        &self.inner.thing_name
    }

    /// Code the status and control endpoints answer with, zero for success.
    pub fn error_code(&self) -> i64 {
        self.inner.error_code.load(Ordering::SeqCst)
    }

    pub fn set_error_code(&self, code: i64) {
        self.inner.error_code.store(code, Ordering::SeqCst);
    }

    /// Number of control requests accepted so far.
    pub fn control_count(&self) -> usize {
        self.inner.controls.load(Ordering::SeqCst)
    }

    /// Open notification streams.
    pub fn listener_count(&self) -> usize {
        self.inner.notifier.receiver_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    /// Current `(bottom, middle)` rails of a blind.
    pub fn rails(&self, id: PeripheralId) -> Option<(u8, u8)> {
        self.blinds().get(&id).map(|blind| (blind.bottom, blind.middle))
    }

    pub fn directory(&self) -> Directory {
        let mut rooms: Vec<Room> = Vec::new();

        for blind in self.blinds().values() {
            let settings = &blind.settings;
            let entry = PeripheralEntry {
                uid: Some(settings.id.into()),
                name: Some(settings.name.clone()),
                module_type: Some(settings.module_type),
                module_detail: None,
            };

            let room_index = match rooms
                .iter()
                .position(|room| room.name.as_deref() == Some(settings.room.as_str()))
            {
                Some(index) => index,
                None => {
                    rooms.push(Room {
                        id: Some(rooms.len() as i64 + 1),
                        name: Some(settings.room.clone()),
                        groups: Vec::new(),
                    });
                    rooms.len() - 1
                }
            };

            let room = &mut rooms[room_index];
            match room
                .groups
                .iter_mut()
                .find(|group| group.name.as_deref() == Some(settings.group.as_str()))
            {
                Some(group) => group.peripherals.push(entry),
                None => {
                    let id = room_index as i64 * 100 + room.groups.len() as i64 + 1;
                    room.groups.push(Group {
                        id: Some(id),
                        name: Some(settings.group.clone()),
                        peripherals: vec![entry],
                    });
                }
            }
        }

        Directory { rooms }
    }

    pub fn status(&self) -> Vec<PeripheralStatus> {
        self.blinds().values().map(MockBlind::status).collect()
    }

    /// Accepts a control request and starts the motor; returns the hub error code.
    pub fn control(&self, request: &ControlRequest) -> i64 {
        let id = request.peripheral_id;

        {
            let mut blinds = self.blinds();
            let Some(blind) = blinds.get_mut(&id) else {
                tracing::warn!("Control request for unknown peripheral {}", id);
                return ERROR_UNKNOWN_PERIPHERAL;
            };

            blind.target_bottom = request.bottom_rail_position.min(RAIL_MAX);
            blind.target_middle = request.middle_rail_position.min(RAIL_MAX);
        }

        self.inner.controls.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            "Peripheral {} moving to bottom {}, middle {}",
            id,
            request.bottom_rail_position,
            request.middle_rail_position
        );

        if self.inner.motor.step == 0 {
            self.advance(id);
        } else {
            let hub = self.clone();
            tokio::spawn(async move { hub.drive(id).await });
        }

        0
    }

    /// Moves a blind as if someone used its remote: instantly, without a control request.
    pub fn simulate_remote(&self, id: PeripheralId, bottom: u8, middle: u8) -> bool {
        {
            let mut blinds = self.blinds();
            let Some(blind) = blinds.get_mut(&id) else {
                return false;
            };

            blind.bottom = bottom.min(RAIL_MAX);
            blind.middle = middle.min(RAIL_MAX);
            blind.target_bottom = blind.bottom;
            blind.target_middle = blind.middle;
        }

        self.notify(id);
        true
    }

    async fn drive(&self, id: PeripheralId) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.inner.motor.tick_ms.max(1)));
        interval.tick().await;

        loop {
            interval.tick().await;
            if !self.advance(id) {
                break;
            }
        }
    }

    /// One motor tick; returns whether the blind is still moving.
    fn advance(&self, id: PeripheralId) -> bool {
        let step = self.inner.motor.step;

        let moving = {
            let mut blinds = self.blinds();
            let Some(blind) = blinds.get_mut(&id) else {
                return false;
            };

            if !blind.is_moving() {
                return false;
            }

            blind.bottom = step_towards(blind.bottom, blind.target_bottom, step);
            blind.middle = step_towards(blind.middle, blind.target_middle, step);
            blind.is_moving()
        };

        self.notify(id);
        moving
    }

    fn notify(&self, id: PeripheralId) {
        tracing::debug!("Notifying change of peripheral {}", id);
        let _ = self.inner.notifier.send(Notification::for_peripherals([id]));
    }
}
