use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use norman_api::*;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{Error, Result};
use crate::hub::{HubApi, NotificationStream};

pub(crate) fn status_entry(id: PeripheralId, bottom: i64, middle: i64) -> PeripheralStatus {
    PeripheralStatus {
        uid: Some(id.into()),
        bottom_rail_position: Some(bottom),
        middle_rail_position: Some(middle),
        target_bottom_rail_position: Some(bottom),
        target_middle_rail_position: Some(middle),
        ..Default::default()
    }
}

/// Status entry of a peripheral whose rails have not been reported yet.
pub(crate) fn unknown_status(id: PeripheralId) -> PeripheralStatus {
    PeripheralStatus {
        uid: Some(id.into()),
        ..Default::default()
    }
}

/// In-memory hub recording every request it receives.
pub(crate) struct FakeHub {
    reachable: AtomicBool,
    status: Mutex<Vec<PeripheralStatus>>,
    controls: Mutex<Vec<(PeripheralId, u8, u8)>>,
    validations: AtomicUsize,
    directory_requests: AtomicUsize,
    status_requests: AtomicUsize,
    stream_opens: AtomicUsize,
    notifications: broadcast::Sender<Notification>,
}

impl FakeHub {
    pub(crate) fn with_status(status: Vec<PeripheralStatus>) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            status: Mutex::new(status),
            controls: Mutex::new(Vec::new()),
            validations: AtomicUsize::new(0),
            directory_requests: AtomicUsize::new(0),
            status_requests: AtomicUsize::new(0),
            stream_opens: AtomicUsize::new(0),
            notifications: broadcast::channel(16).0,
        }
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn set_status(&self, status: Vec<PeripheralStatus>) {
        *self.status.lock().unwrap() = status;
    }

    pub(crate) fn notify(&self, ids: &[PeripheralId]) {
        let _ = self
            .notifications
            .send(Notification::for_peripherals(ids.iter().copied()));
    }

    pub(crate) fn controls(&self) -> Vec<(PeripheralId, u8, u8)> {
        self.controls.lock().unwrap().clone()
    }

    pub(crate) fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub(crate) fn directory_requests(&self) -> usize {
        self.directory_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn status_requests(&self) -> usize {
        self.status_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::communication(
                "fake://hub",
                io::Error::new(io::ErrorKind::ConnectionRefused, "hub offline"),
            ))
        }
    }
}

#[async_trait]
impl HubApi for FakeHub {
    async fn validate_connection(&self) -> Result<()> {
        self.check_reachable()?;
        self.validations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_devices(&self) -> Result<Directory> {
        self.check_reachable()?;
        self.directory_requests.fetch_add(1, Ordering::SeqCst);

        let peripherals = self
            .status
            .lock()
            .unwrap()
            .iter()
            .filter_map(PeripheralStatus::id)
            .map(|id| PeripheralEntry {
                uid: Some(id.into()),
                name: Some(format!("Blind {id}")),
                module_type: Some(1),
                module_detail: None,
            })
            .collect();

        Ok(Directory {
            rooms: vec![Room {
                id: Some(1),
                name: Some("Study".to_string()),
                groups: vec![Group {
                    id: Some(1),
                    name: Some("Windows".to_string()),
                    peripherals,
                }],
            }],
        })
    }

    async fn get_status(&self) -> Result<StatusResponse> {
        self.check_reachable()?;
        self.status_requests.fetch_add(1, Ordering::SeqCst);

        Ok(StatusResponse {
            error: 0,
            peripherals: self.status.lock().unwrap().clone(),
        })
    }

    async fn set_position(&self, id: PeripheralId, bottom: u8, middle: u8) -> Result<()> {
        self.check_reachable()?;
        self.controls.lock().unwrap().push((id, bottom, middle));
        Ok(())
    }

    async fn listen_notifications(&self) -> Result<NotificationStream> {
        self.check_reachable()?;
        self.stream_opens.fetch_add(1, Ordering::SeqCst);

        let receiver = self.notifications.subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(notification) => return Some((Ok(notification), receiver)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream.boxed())
    }
}
