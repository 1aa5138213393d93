use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::Json;
use futures::stream;
use norman_api::*;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::hub::MockHub;

pub async fn registration(
    State(hub): State<MockHub>,
    Json(request): Json<RegistrationRequest>,
) -> Json<RegistrationResponse> {
    tracing::debug!("Registration at {}", request.timestamp);

    Json(RegistrationResponse {
        error: 0,
        thing_name: Some(hub.thing_name().to_string()),
    })
}

pub async fn get_all_peripheral(
    State(hub): State<MockHub>,
    Json(request): Json<PeripheralListRequest>,
) -> Json<PeripheralListResponse> {
    if request.thing_name.as_deref() != Some(hub.thing_name()) {
        tracing::warn!("Directory requested with thing name {:?}", request.thing_name);

        return Json(PeripheralListResponse {
            status: ResponseStatus {
                code: 1,
                error: Some("Unknown thing name".to_string()),
            },
            results: None,
        });
    }

    Json(PeripheralListResponse {
        status: ResponseStatus::default(),
        results: Some(hub.directory()),
    })
}

pub async fn status(
    State(hub): State<MockHub>,
    Json(_request): Json<StatusRequest>,
) -> Json<StatusResponse> {
    let error = hub.error_code();
    let peripherals = if error == 0 { hub.status() } else { Vec::new() };

    Json(StatusResponse { error, peripherals })
}

pub async fn control(
    State(hub): State<MockHub>,
    Json(request): Json<ControlRequest>,
) -> Json<ErrorResponse> {
    let error = match hub.error_code() {
        0 => hub.control(&request),
        code => code,
    };

    Json(ErrorResponse { error })
}

/// Long-poll stream: an acknowledgement, then one JSON object per change, unframed.
pub async fn notification(State(hub): State<MockHub>) -> Body {
    tracing::info!("Notification listener connected");

    let ack = serde_json::to_vec(&ErrorResponse::default()).unwrap_or_default();
    let notifications = BroadcastStream::new(hub.subscribe()).filter_map(|result| {
        result
            .ok()
            .and_then(|notification| serde_json::to_vec(&notification).ok())
    });

    let body = stream::once(async move { ack })
        .chain(notifications)
        .map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk)));

    Body::from_stream(body)
}
