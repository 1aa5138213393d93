use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use norman_client::configs::{CoverOverride, Hub, Logger, Notification, Settings};
use norman_client::{CoverVariant, HubConnection, ListenerHandle};
use norman_mock::settings as mock;
use norman_mock::MockServer;

pub struct MockHub {
    pub server: MockServer,
    pub connection: Arc<HubConnection>,
    listener: Option<ListenerHandle>,
}

impl MockHub {
    pub async fn new() -> Self {
        Self::with_covers(HashMap::new()).await
    }

    pub async fn with_covers(covers: HashMap<u32, CoverVariant>) -> Self {
        let server = MockServer::start(&mock_settings()).await.unwrap();
        let settings = client_settings(&server.host(), server.port(), covers);
        let connection = HubConnection::from_settings(&settings).await.unwrap();

        Self {
            server,
            connection,
            listener: None,
        }
    }

    /// Starts the notification listener and waits until the mock hub sees it.
    pub async fn listen(&mut self) {
        self.listener = Some(self.connection.spawn_listener());

        let hub = self.server.hub.clone();
        wait_for(|| {
            let hub = hub.clone();
            async move { hub.listener_count() > 0 }
        })
        .await;
    }

    pub async fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
    }
}

pub fn mock_settings() -> mock::Settings {
    let blind = |id: u32, name: &str, bottom: u8, middle: u8| mock::Blind {
        id,
        name: name.to_string(),
        room: "Living Room".to_string(),
        group: "Front Windows".to_string(),
        module_type: 1,
        bottom,
        middle,
        battery_voltage: 12.1,
        firmware_version: "1.0.0".to_string(),
    };

    mock::Settings {
        logger: mock::Logger {
            level: "debug".to_string(),
        },
        server: mock::Server {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        hub: mock::Hub {
            thing_name: "NormanHub-Test".to_string(),
            motor: mock::Motor { step: 0, tick_ms: 10 },
        },
        blinds: vec![blind(101, "Left", 40, 60), blind(102, "Right", 95, 50)],
    }
}

pub fn client_settings(host: &str, port: u16, covers: HashMap<u32, CoverVariant>) -> Settings {
    Settings {
        logger: Logger {
            level: "debug".to_string(),
        },
        hub: Hub {
            host: host.to_string(),
            port,
            request_timeout: 2,
        },
        notification: Notification {
            reconnect_interval: 1,
            periodic_reconnect: None,
        },
        covers: covers
            .into_iter()
            .map(|(id, variant)| (id.to_string(), CoverOverride { variant }))
            .collect(),
    }
}

pub async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met within 5 seconds");
}
