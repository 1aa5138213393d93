use norman_api::*;
use norman_mock::settings::{Blind, Hub, Logger, Motor, Server, Settings};
use norman_mock::MockServer;
use serde_json::{json, Value};

fn settings() -> Settings {
    Settings {
        logger: Logger {
            level: "debug".to_string(),
        },
        server: Server {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        hub: Hub {
            thing_name: "api-test".to_string(),
            motor: Motor { step: 0, tick_ms: 10 },
        },
        blinds: vec![Blind {
            id: 7,
            name: "Kitchen".to_string(),
            room: "Kitchen".to_string(),
            group: "Sink".to_string(),
            module_type: 1,
            bottom: 20,
            middle: 30,
            battery_voltage: 11.8,
            firmware_version: "2.0.1".to_string(),
        }],
    }
}

async fn post(server: &MockServer, endpoint: &str, body: Value) -> Value {
    reqwest::Client::new()
        .post(format!("http://{}{}", server.address, endpoint))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_registration_and_directory() {
    let server = MockServer::start(&settings()).await.unwrap();

    let registration = post(&server, ENDPOINT_REGISTRATION, json!({ "Timestamp": 1 })).await;
    assert_eq!(registration, json!({ "Error": 0, "ThingName": "api-test" }));

    let directory = post(
        &server,
        ENDPOINT_GET_ALL_PERIPHERAL,
        json!({ "ThingName": "api-test", "TaskID": 12, "Timestamp": 1 }),
    )
    .await;
    assert_eq!(directory["status"]["code"], 0);
    assert_eq!(
        directory["results"]["RoomList"][0]["GroupList"][0]["PeripheralList"][0]["PeripheralName"],
        "Kitchen"
    );

    let rejected = post(
        &server,
        ENDPOINT_GET_ALL_PERIPHERAL,
        json!({ "ThingName": null, "TaskID": 12, "Timestamp": 1 }),
    )
    .await;
    assert_eq!(rejected["status"]["code"], 1);
}

#[tokio::test]
async fn test_control_and_status() {
    let server = MockServer::start(&settings()).await.unwrap();

    let control = json!({
        "PeripheralUID": 7,
        "Timestamp": 1,
        "TaskID": 3,
        "BottomRailPosition": 90,
        "MiddleRailPosition": 10,
    });
    assert_eq!(post(&server, ENDPOINT_CONTROL, control).await, json!({ "Error": 0 }));

    let status = post(&server, ENDPOINT_STATUS, json!({ "Timestamp": 2 })).await;
    let blind = &status["Peripherals"][0];
    assert_eq!(blind["PeripheralUID"], 7);
    assert_eq!(blind["BottomRailPosition"], 90);
    assert_eq!(blind["MiddleRailPosition"], 10);
    assert_eq!(blind["FirmwareVersion"], "2.0.1");

    server.hub.set_error_code(5);
    let status = post(&server, ENDPOINT_STATUS, json!({ "Timestamp": 3 })).await;
    assert_eq!(status["Error"], 5);
}
