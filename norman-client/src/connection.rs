use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use norman_api::{Directory, PeripheralId};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::configs::Settings;
use crate::error::{Error, Result};
use crate::hub::{HubApi, HubClient};
use crate::peripheral::{merge_peripherals, CoverVariant, Peripheral};

/// Receives the hub-reported state of one peripheral.
///
/// Called from the connection's refresh path, which may run on any runtime worker.
#[async_trait]
pub trait PushListener: Send + Sync {
    async fn on_push_update(&self, update: Peripheral);
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub reconnect_interval: Duration,
    pub periodic_reconnect: Option<Duration>,
    pub variants: HashMap<PeripheralId, CoverVariant>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(15),
            periodic_reconnect: None,
            variants: HashMap::new(),
        }
    }
}

impl From<&Settings> for ConnectionOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            reconnect_interval: settings.notification.reconnect_interval(),
            periodic_reconnect: settings.notification.periodic_reconnect(),
            variants: settings.variant_overrides(),
        }
    }
}

type ListenerEntry = (u64, Arc<dyn PushListener>);

#[derive(Default)]
struct ListenerRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<PeripheralId, Vec<ListenerEntry>>>,
}

impl ListenerRegistry {
    fn entries(&self) -> MutexGuard<'_, HashMap<PeripheralId, Vec<ListenerEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, peripheral_id: PeripheralId, listener: Arc<dyn PushListener>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries()
            .entry(peripheral_id)
            .or_default()
            .push((id, listener));
        id
    }

    fn remove(&self, peripheral_id: PeripheralId, id: u64) {
        let mut entries = self.entries();
        if let Some(listeners) = entries.get_mut(&peripheral_id) {
            listeners.retain(|(entry_id, _)| *entry_id != id);
            if listeners.is_empty() {
                entries.remove(&peripheral_id);
            }
        }
    }

    fn listeners_of(&self, peripheral_id: PeripheralId) -> Vec<Arc<dyn PushListener>> {
        self.entries()
            .get(&peripheral_id)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    fn count(&self) -> usize {
        self.entries().values().map(Vec::len).sum()
    }
}

/// Registration of a [`PushListener`]. Dropping it unregisters the listener.
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    peripheral_id: PeripheralId,
    id: u64,
}

impl Subscription {
    pub fn peripheral_id(&self) -> PeripheralId {
        self.peripheral_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.peripheral_id, self.id);
        }
    }
}

/// Stops the notification listener task.
pub struct ListenerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub async fn shutdown(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Notification listener ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

enum ListenOutcome {
    Closed,
    PeriodicReconnect,
    Failed(Error),
}

/// The single logical connection to one hub, shared by every cover on it.
pub struct HubConnection {
    api: Arc<dyn HubApi>,
    options: ConnectionOptions,
    directory: RwLock<Option<Directory>>,
    peripherals: RwLock<BTreeMap<PeripheralId, Peripheral>>,
    last_update_success: AtomicBool,
    listeners: Arc<ListenerRegistry>,
}

impl HubConnection {
    pub fn new(api: Arc<dyn HubApi>, options: ConnectionOptions) -> Self {
        Self {
            api,
            options,
            directory: RwLock::new(None),
            peripherals: RwLock::new(BTreeMap::new()),
            last_update_success: AtomicBool::new(false),
            listeners: Arc::new(ListenerRegistry::default()),
        }
    }

    /// Validates the hub and loads the first snapshot of its peripherals.
    pub async fn connect(api: Arc<dyn HubApi>, options: ConnectionOptions) -> Result<Arc<Self>> {
        api.validate_connection().await?;

        let connection = Arc::new(Self::new(api, options));
        connection.refresh().await?;

        Ok(connection)
    }

    pub async fn from_settings(settings: &Settings) -> Result<Arc<Self>> {
        let client = HubClient::new(&settings.hub)?;
        Self::connect(Arc::new(client), ConnectionOptions::from(settings)).await
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Acquire)
    }

    pub async fn peripherals(&self) -> Vec<Peripheral> {
        self.peripherals.read().await.values().cloned().collect()
    }

    pub async fn peripheral(&self, id: PeripheralId) -> Option<Peripheral> {
        self.peripherals.read().await.get(&id).cloned()
    }

    /// The last refresh succeeded and the hub still lists the peripheral.
    pub async fn is_available(&self, id: PeripheralId) -> bool {
        self.last_update_success() && self.peripherals.read().await.contains_key(&id)
    }

    pub fn subscribe(&self, id: PeripheralId, listener: Arc<dyn PushListener>) -> Subscription {
        let entry_id = self.listeners.insert(id, listener);

        Subscription {
            registry: Arc::downgrade(&self.listeners),
            peripheral_id: id,
            id: entry_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.count()
    }

    /// Re-reads the hub and pushes the reported state to every subscriber.
    pub async fn refresh(&self) -> Result<()> {
        let peripherals = match self.fetch().await {
            Ok(peripherals) => peripherals,
            Err(e) => {
                self.last_update_success.store(false, Ordering::Release);
                tracing::warn!("Error communicating with Norman hub: {}", e);
                return Err(e);
            }
        };

        *self.peripherals.write().await = peripherals.clone();
        self.last_update_success.store(true, Ordering::Release);

        for (id, peripheral) in peripherals {
            for listener in self.listeners.listeners_of(id) {
                listener.on_push_update(peripheral.clone()).await;
            }
        }

        Ok(())
    }

    async fn fetch(&self) -> Result<BTreeMap<PeripheralId, Peripheral>> {
        let cached = self
            .directory
            .read()
            .await
            .as_ref()
            .is_some_and(|directory| !directory.rooms.is_empty());

        if !cached {
            let directory = self.api.get_devices().await?;
            *self.directory.write().await = Some(directory);
        }

        let status = self.api.get_status().await?;

        let directory = self.directory.read().await;
        Ok(merge_peripherals(
            directory.as_ref(),
            &status,
            &self.options.variants,
        ))
    }

    /// Sends an absolute command; the new state arrives later through a refresh.
    pub async fn set_position(
        self: &Arc<Self>,
        id: PeripheralId,
        bottom: u8,
        middle: u8,
    ) -> Result<()> {
        self.api.set_position(id, bottom, middle).await?;
        self.request_refresh();
        Ok(())
    }

    pub fn request_refresh(self: &Arc<Self>) {
        let connection = self.clone();
        tokio::spawn(async move {
            let _ = connection.refresh().await;
        });
    }

    pub fn spawn_listener(self: &Arc<Self>) -> ListenerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let connection = self.clone();
        let task = tokio::spawn(async move {
            connection.listen_notifications(stop_rx).await;
        });

        ListenerHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }

    async fn listen_notifications(&self, mut stop_rx: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    tracing::debug!("Notification listener task cancelled");
                    return;
                },
                outcome = self.listen_once() => match outcome {
                    ListenOutcome::PeriodicReconnect => {
                        tracing::debug!("Periodic reconnection time arrived");
                        continue;
                    }
                    ListenOutcome::Closed => {
                        tracing::warn!("Notification stream closed by hub");
                    }
                    ListenOutcome::Failed(e) => {
                        tracing::error!("Notification listener disconnected: {}", e);
                    }
                }
            }

            tracing::info!(
                "Reconnecting notification listener in {:?}",
                self.options.reconnect_interval
            );

            tokio::select! {
                _ = &mut stop_rx => {
                    tracing::debug!("Notification listener sleep cancelled");
                    return;
                },
                _ = tokio::time::sleep(self.options.reconnect_interval) => {}
            }

            // Blinds may have moved while the stream was down
            tracing::debug!("Refreshing device states after notification reconnection");
            let _ = self.refresh().await;
        }
    }

    async fn listen_once(&self) -> ListenOutcome {
        let mut notifications = match self.api.listen_notifications().await {
            Ok(stream) => stream,
            Err(e) => return ListenOutcome::Failed(e),
        };

        let deadline = self
            .options
            .periodic_reconnect
            .map(|period| Instant::now() + period);

        loop {
            let next = match deadline {
                Some(deadline) => match timeout_at(deadline, notifications.next()).await {
                    Ok(next) => next,
                    Err(_) => return ListenOutcome::PeriodicReconnect,
                },
                None => notifications.next().await,
            };

            match next {
                Some(Ok(notification)) => {
                    tracing::debug!(
                        "Received notification for peripherals {:?}",
                        notification.peripheral_ids()
                    );
                    let _ = self.refresh().await;
                }
                Some(Err(e)) => return ListenOutcome::Failed(e),
                None => return ListenOutcome::Closed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::testing::{status_entry, FakeHub};

    #[derive(Default)]
    struct RecordingListener {
        updates: tokio::sync::Mutex<Vec<Peripheral>>,
    }

    #[async_trait]
    impl PushListener for RecordingListener {
        async fn on_push_update(&self, update: Peripheral) {
            self.updates.lock().await.push(update);
        }
    }

    #[tokio::test]
    async fn test_connect_loads_peripherals() {
        let hub = Arc::new(FakeHub::with_status(vec![status_entry(1, 40, 100)]));

        let connection = HubConnection::connect(hub.clone(), ConnectionOptions::default())
            .await
            .unwrap();

        assert!(connection.last_update_success());
        assert!(connection.is_available(1).await);
        assert!(!connection.is_available(2).await);
        assert_eq!(connection.peripheral(1).await.unwrap().name, "Blind 1");
        assert_eq!(hub.validations(), 1);
    }

    #[tokio::test]
    async fn test_connect_fails_when_hub_unreachable() {
        let hub = Arc::new(FakeHub::with_status(vec![]));
        hub.set_reachable(false);

        let result = HubConnection::connect(hub, ConnectionOptions::default()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_directory_fetched_once() {
        let hub = Arc::new(FakeHub::with_status(vec![status_entry(1, 40, 100)]));
        let connection = HubConnection::connect(hub.clone(), ConnectionOptions::default())
            .await
            .unwrap();

        connection.refresh().await.unwrap();
        connection.refresh().await.unwrap();

        assert_eq!(hub.directory_requests(), 1);
        assert_eq!(hub.status_requests(), 3);
    }

    #[tokio::test]
    async fn test_refresh_failure_marks_unavailable() {
        let hub = Arc::new(FakeHub::with_status(vec![status_entry(1, 40, 100)]));
        let connection = HubConnection::connect(hub.clone(), ConnectionOptions::default())
            .await
            .unwrap();

        hub.set_reachable(false);
        let error = connection.refresh().await.unwrap_err();

        assert!(error.is_communication());
        assert!(!connection.last_update_success());
        assert!(!connection.is_available(1).await);

        hub.set_reachable(true);
        connection.refresh().await.unwrap();
        assert!(connection.is_available(1).await);
    }

    #[tokio::test]
    async fn test_refresh_dispatches_to_subscribers() {
        let hub = Arc::new(FakeHub::with_status(vec![
            status_entry(1, 40, 100),
            status_entry(2, 70, 50),
        ]));
        let connection = HubConnection::connect(hub.clone(), ConnectionOptions::default())
            .await
            .unwrap();

        let listener = Arc::new(RecordingListener::default());
        let _subscription = connection.subscribe(2, listener.clone());

        connection.refresh().await.unwrap();

        let updates = listener.updates.lock().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, 2);
        assert_eq!(updates[0].bottom_rail_position, Some(70));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unregisters() {
        let hub = Arc::new(FakeHub::with_status(vec![status_entry(1, 40, 100)]));
        let connection = HubConnection::connect(hub, ConnectionOptions::default())
            .await
            .unwrap();

        let listener = Arc::new(RecordingListener::default());
        let first = connection.subscribe(1, listener.clone());
        let second = connection.subscribe(1, listener.clone());
        assert_eq!(connection.subscriber_count(), 2);
        assert_eq!(first.peripheral_id(), 1);

        drop(first);
        assert_eq!(connection.subscriber_count(), 1);

        drop(second);
        assert_eq!(connection.subscriber_count(), 0);

        connection.refresh().await.unwrap();
        assert!(listener.updates.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_notification_triggers_refresh() {
        let hub = Arc::new(FakeHub::with_status(vec![status_entry(1, 40, 100)]));
        let connection = HubConnection::connect(hub.clone(), ConnectionOptions::default())
            .await
            .unwrap();

        struct Counter(AtomicUsize);

        #[async_trait]
        impl PushListener for Counter {
            async fn on_push_update(&self, _update: Peripheral) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let _subscription = connection.subscribe(1, counter.clone());

        let handle = connection.spawn_listener();
        while hub.stream_opens() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        hub.set_status(vec![status_entry(1, 55, 100)]);
        hub.notify(&[1]);

        for _ in 0..100 {
            if connection.peripheral(1).await.unwrap().bottom_rail_position == Some(55) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(connection.peripheral(1).await.unwrap().bottom_rail_position, Some(55));
        assert!(counter.0.load(Ordering::SeqCst) >= 1);
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_shutdown_while_reconnecting() {
        let hub = Arc::new(FakeHub::with_status(vec![status_entry(1, 40, 100)]));
        let options = ConnectionOptions {
            reconnect_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let connection = HubConnection::connect(hub.clone(), options).await.unwrap();

        hub.set_reachable(false);
        let handle = connection.spawn_listener();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_periodic_reconnect_reopens_stream() {
        let hub = Arc::new(FakeHub::with_status(vec![status_entry(1, 40, 100)]));
        let options = ConnectionOptions {
            periodic_reconnect: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let connection = HubConnection::connect(hub.clone(), options).await.unwrap();

        let handle = connection.spawn_listener();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().await;

        assert!(hub.stream_opens() >= 2);
    }
}
