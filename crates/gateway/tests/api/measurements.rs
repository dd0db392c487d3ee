use std::collections::BTreeMap;

use crate::helpers::{get, post, read_json, spawn_app, standard_keys, TestApp};
use axum::http::StatusCode;
use kma_gateway::ReadingReport;
use tower::ServiceExt;

async fn ingested_app() -> TestApp {
    let test_app = spawn_app(standard_keys()).await;
    let response = test_app
        .app
        .clone()
        .oneshot(post(
            "/api/kma/fetch?tm1=202501010200&tm2=202501010300",
            Some("valid-key"),
        ))
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), StatusCode::OK);
    test_app
}

async fn temperature_id(test_app: &TestApp) -> i64 {
    test_app
        .database
        .sensor_by_name("temperature")
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn range_query_returns_local_readings() {
    let test_app = ingested_app().await;
    let temperature = temperature_id(&test_app).await;

    let response = test_app
        .app
        .clone()
        .oneshot(get(
            "/api/measurements/list?sensor_name=temperature&start=2025-01-01T00:00:00&end=2025-01-01T03:00",
            Some("valid-key"),
        ))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    let readings: Vec<ReadingReport> = read_json(response).await;
    assert_eq!(
        readings,
        vec![ReadingReport {
            sensor_id: temperature,
            value: Some(12.3),
            sensing_date: String::from("2025-01-01T02:00:00+09:00"),
        }]
    );
}

#[tokio::test]
async fn id_lookup_goes_through_the_catalog() {
    let test_app = ingested_app().await;
    let temperature = temperature_id(&test_app).await;

    let response = test_app
        .app
        .clone()
        .oneshot(get(
            &format!(
                "/api/measurements/{}?duration_sec=1000000000",
                temperature
            ),
            Some("valid-key"),
        ))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    let readings: Vec<ReadingReport> = read_json(response).await;
    assert_eq!(readings.len(), 2);
    assert!(readings.iter().all(|r| r.sensor_id == temperature));
    assert_eq!(readings[1].value, Some(11.8));

    let response = test_app
        .app
        .clone()
        .oneshot(get(
            "/api/measurements/by-name/temperature?duration_sec=1000000000",
            Some("valid-key"),
        ))
        .await
        .expect("Failed to execute request.");
    let by_name: Vec<ReadingReport> = read_json(response).await;
    assert_eq!(by_name, readings);
}

#[tokio::test]
async fn default_lookback_is_one_day() {
    let test_app = ingested_app().await;

    let response = test_app
        .app
        .clone()
        .oneshot(get("/api/measurements/by-name/temperature", Some("valid-key")))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    let readings: Vec<ReadingReport> = read_json(response).await;
    assert!(readings.is_empty());
}

#[tokio::test]
async fn grouped_query_keys_by_sensor_name() {
    let test_app = ingested_app().await;

    let response = test_app
        .app
        .clone()
        .oneshot(get(
            "/api/measurements/list/grouped?start=2025-01-01T00:00:00&end=2025-01-02T00:00:00",
            Some("valid-key"),
        ))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    let grouped: BTreeMap<String, Vec<ReadingReport>> = read_json(response).await;
    assert_eq!(
        grouped.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["pressure", "rainfall", "temperature", "wind_dir", "wind_speed"]
    );
    assert!(grouped.values().all(|readings| readings.len() == 2));
    assert_eq!(grouped["rainfall"][1].value, Some(0.5));
}

#[tokio::test]
async fn unknown_sensors_are_not_found() {
    let test_app = ingested_app().await;

    for uri in [
        "/api/measurements/9999",
        "/api/measurements/by-name/humidity",
        "/api/measurements/list?sensor_name=humidity&start=2025-01-01T00:00:00&end=2025-01-02T00:00:00",
    ] {
        let response = test_app
            .app
            .clone()
            .oneshot(get(uri, Some("valid-key")))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn malformed_ranges_are_bad_requests() {
    let test_app = ingested_app().await;

    for uri in [
        "/api/measurements/list/grouped?start=202501010000&end=2025-01-02T00:00:00",
        "/api/measurements/list/grouped?start=2025-01-02T00:00:00&end=2025-01-01T00:00:00",
        "/api/measurements/by-name/temperature?duration_sec=0",
        "/api/measurements/not-a-number",
    ] {
        let response = test_app
            .app
            .clone()
            .oneshot(get(uri, Some("valid-key")))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[tokio::test]
async fn queries_are_gated() {
    let test_app = ingested_app().await;

    for uri in [
        "/api/measurements/list/grouped?start=2025-01-01T00:00:00&end=2025-01-02T00:00:00",
        "/api/measurements/by-name/temperature",
    ] {
        let response = test_app
            .app
            .clone()
            .oneshot(get(uri, None))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}
