use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use dashboard::{HttpApiClient, NewReading, TelemetrySource};
use serde_json::{json, Value};
use std::collections::HashMap;

fn reading_json(device_id: &str, temperature: f64) -> Value {
    json!({
        "_id": format!("id-{}", device_id),
        "deviceId": device_id,
        "temperature": temperature,
        "humidity": 40.0,
        "timestamp": "2024-05-01T08:00:00Z",
    })
}

async fn serve_mock() -> String {
    let app = Router::new()
        .route(
            "/api/data",
            post(|Json(body): Json<Value>| async move {
                let device_id = body["deviceId"].as_str().unwrap_or_default().to_string();
                let temperature = body["temperature"].as_f64().unwrap_or_default();
                (StatusCode::CREATED, Json(reading_json(&device_id, temperature)))
            }),
        )
        .route(
            "/api/data/latest",
            get(|| async { Json(json!([reading_json("A", 26.0), reading_json("B", 18.0)])) }),
        )
        .route(
            "/api/data/latest/:device_id",
            get(|Path(device_id): Path<String>| async move {
                match device_id.as_str() {
                    "ghost" => (
                        StatusCode::NOT_FOUND,
                        Json(json!({"message": "No data found for this device"})),
                    ),
                    "broken" => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"message": "Reading store is unavailable"})),
                    ),
                    _ => (StatusCode::OK, Json(json!([reading_json(&device_id, 21.0)]))),
                }
            }),
        )
        .route(
            "/api/data/history/:device_id",
            get(
                |Path(device_id): Path<String>, Query(params): Query<HashMap<String, String>>| async move {
                    let limit: usize = params
                        .get("limit")
                        .and_then(|l| l.parse().ok())
                        .unwrap_or(20);
                    let readings: Vec<Value> = (0..limit)
                        .map(|i| reading_json(&device_id, i as f64))
                        .collect();
                    Json(Value::Array(readings))
                },
            ),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn latest_all_decodes_readings() {
    let client = HttpApiClient::new(&serve_mock().await).unwrap();

    let latest = client.latest_all().await.unwrap();

    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].id, "id-A");
    assert_eq!(latest[0].device_id, "A");
    assert_eq!(latest[0].temperature, 26.0);
    assert_eq!(latest[1].device_id, "B");
}

#[tokio::test]
async fn latest_encodes_device_id() {
    let client = HttpApiClient::new(&serve_mock().await).unwrap();

    let latest = client.latest("dev 1/x").await.unwrap();

    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].device_id, "dev 1/x");
}

#[tokio::test]
async fn error_status_carries_server_message() {
    let client = HttpApiClient::new(&serve_mock().await).unwrap();

    let missing = client.latest("ghost").await.unwrap_err();
    assert!(missing.is_not_found());
    assert!(missing.to_string().contains("No data found for this device"));

    let broken = client.latest("broken").await.unwrap_err();
    assert!(!broken.is_not_found());
    assert!(matches!(
        broken,
        dashboard::Error::Status { status: 500, .. }
    ));
}

#[tokio::test]
async fn history_sends_limit() {
    let client = HttpApiClient::new(&serve_mock().await).unwrap();

    let history = client.history("A", 3).await.unwrap();

    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn add_reading_posts_to_collection() {
    let client = HttpApiClient::new(&format!("{}/", serve_mock().await)).unwrap();

    let stored = client
        .add_reading(&NewReading {
            device_id: "C".to_string(),
            temperature: 0.0,
            humidity: 0.0,
        })
        .await
        .unwrap();

    assert_eq!(stored.device_id, "C");
    assert_eq!(stored.temperature, 0.0);
}

#[test]
fn invalid_base_url_is_rejected() {
    assert!(matches!(
        HttpApiClient::new("not a url"),
        Err(dashboard::Error::InvalidUrl(_))
    ));
    assert!(matches!(
        HttpApiClient::new("mailto:ops@example.com"),
        Err(dashboard::Error::InvalidUrl(_))
    ));
}
