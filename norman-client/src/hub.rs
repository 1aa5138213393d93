use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use norman_api::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::configs::Hub;
use crate::error::{Error, Result};

pub type NotificationStream = BoxStream<'static, Result<Notification>>;

/// Request/response and push surface of a Norman hub.
#[async_trait]
pub trait HubApi: Send + Sync {
    /// Registers with the hub, proving it is reachable.
    async fn validate_connection(&self) -> Result<()>;

    /// Rooms, groups and peripherals configured on the hub.
    async fn get_devices(&self) -> Result<Directory>;

    /// Live rail positions, battery and firmware of every peripheral.
    async fn get_status(&self) -> Result<StatusResponse>;

    /// Moves both rails of a peripheral (0 closed, 100 open).
    async fn set_position(&self, id: PeripheralId, bottom: u8, middle: u8) -> Result<()>;

    /// Opens the long-poll notification stream.
    async fn listen_notifications(&self) -> Result<NotificationStream>;
}

/// HTTP client for the hub's local API.
pub struct HubClient {
    host: String,
    base_url: String,
    http_client: reqwest::Client,
    request_timeout: Duration,
    thing_name: RwLock<Option<String>>,
}

impl HubClient {
    pub fn new(settings: &Hub) -> Result<Self> {
        let base_url = format!("http://{}:{}", settings.host, settings.port);

        let http_client = reqwest::Client::builder()
            .connect_timeout(settings.request_timeout())
            .build()
            .map_err(|e| Error::communication(&base_url, e))?;

        Ok(Self {
            host: settings.host.clone(),
            base_url,
            http_client,
            request_timeout: settings.request_timeout(),
            thing_name: RwLock::new(None),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn thing_name(&self) -> Option<String> {
        self.thing_name.read().await.clone()
    }

    async fn post<Req, Res>(&self, endpoint: &str, payload: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .http_client
            .post(&url)
            .json(payload)
            .timeout(self.request_timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::communication(&url, e))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::communication(&url, e))?;

        serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidResponse(format!("{endpoint}: {e}")))
    }

    async fn register(&self) -> Result<RegistrationResponse> {
        let request = RegistrationRequest {
            timestamp: unix_timestamp(),
        };

        let response: RegistrationResponse = self.post(ENDPOINT_REGISTRATION, &request).await?;
        if response.error != 0 {
            return Err(Error::api("Registration", response.error, None::<String>));
        }

        tracing::debug!("Registered with hub {} as {:?}", self.host, response.thing_name);
        *self.thing_name.write().await = response.thing_name.clone();

        Ok(response)
    }
}

#[async_trait]
impl HubApi for HubClient {
    async fn validate_connection(&self) -> Result<()> {
        match self.register().await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!("Failed to connect to Norman hub at {}: {}", self.host, e);
                Err(e)
            }
        }
    }

    async fn get_devices(&self) -> Result<Directory> {
        if self.thing_name.read().await.is_none() {
            self.register().await?;
        }

        let request = PeripheralListRequest {
            thing_name: self.thing_name().await,
            task_id: next_task_id(),
            timestamp: unix_timestamp(),
        };

        let response: PeripheralListResponse =
            self.post(ENDPOINT_GET_ALL_PERIPHERAL, &request).await?;
        if response.status.code != 0 {
            return Err(Error::api(
                "GetAllPeripheral",
                response.status.code,
                Some(response.status.error.unwrap_or_else(|| "Unknown error".to_string())),
            ));
        }

        Ok(response.results.unwrap_or_default())
    }

    async fn get_status(&self) -> Result<StatusResponse> {
        let request = StatusRequest {
            timestamp: unix_timestamp(),
        };

        let response: StatusResponse = self.post(ENDPOINT_STATUS, &request).await?;
        if response.error != 0 {
            return Err(Error::api("Status", response.error, None::<String>));
        }

        Ok(response)
    }

    async fn set_position(&self, id: PeripheralId, bottom: u8, middle: u8) -> Result<()> {
        let request = ControlRequest {
            peripheral_id: id,
            timestamp: unix_timestamp(),
            task_id: next_task_id(),
            bottom_rail_position: bottom,
            middle_rail_position: middle,
        };

        tracing::debug!("Sending control request: {:?}", request);

        let response: ErrorResponse = self.post(ENDPOINT_CONTROL, &request).await?;
        if response.error != 0 {
            return Err(Error::api("Control", response.error, None::<String>));
        }

        Ok(())
    }

    async fn listen_notifications(&self) -> Result<NotificationStream> {
        let url = format!("{}{}", self.base_url, ENDPOINT_NOTIFICATION);

        // Long-poll: no request timeout
        let response = self
            .http_client
            .post(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::communication(&url, e))?;

        tracing::info!("Listening for notifications from {}", self.host);

        let mut decoder = NotificationDecoder::default();
        let notifications = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.decode(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(Error::communication(&url, e))],
            })
            .flat_map(stream::iter)
            .boxed();

        Ok(notifications)
    }
}
