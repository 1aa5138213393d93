use std::io;
use std::net::{IpAddr, SocketAddr};

use axum::routing::post;
use axum::Router;
use norman_api::*;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::hub::MockHub;
use crate::settings::Settings;

mod handles;
pub mod hub;
pub mod settings;
mod simulate;

pub fn create_app(hub: MockHub) -> Router {
    Router::new()
        .route(ENDPOINT_REGISTRATION, post(handles::registration))
        .route(ENDPOINT_GET_ALL_PERIPHERAL, post(handles::get_all_peripheral))
        .route(ENDPOINT_STATUS, post(handles::status))
        .route(ENDPOINT_CONTROL, post(handles::control))
        .route(ENDPOINT_NOTIFICATION, post(handles::notification))
        .with_state(hub)
}

/// A mock hub serving on a local socket until dropped.
pub struct MockServer {
    pub address: SocketAddr,
    pub hub: MockHub,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(settings: &Settings) -> io::Result<Self> {
        let ip_addr = settings
            .server
            .host
            .parse::<IpAddr>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(SocketAddr::from((ip_addr, settings.server.port))).await?;
        let address = listener.local_addr()?;

        let hub = MockHub::new(&settings.hub, &settings.blinds);
        let app = create_app(hub.clone());

        tracing::info!("Mock Norman hub listening on {:?}", address);

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Mock hub server stopped: {}", e);
            }
        });

        Ok(Self { address, hub, task })
    }

    pub fn host(&self) -> String {
        self.address.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn run(settings: &Settings) -> io::Result<()> {
    let server = MockServer::start(settings).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Mock hub on {:?} shutting down", server.address);

    Ok(())
}
