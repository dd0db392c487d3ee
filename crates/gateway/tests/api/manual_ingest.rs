use crate::helpers::{post, read_report, spawn_app, spawn_app_with_hub, standard_keys};
use axum::http::StatusCode;
use kma_gateway::RunReport;
use tower::ServiceExt;

#[tokio::test]
async fn observation_trigger_stores_points() {
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
    assert_eq!(
        read_report(response).await,
        RunReport {
            status: String::from("success"),
            code: 200,
            count: 2,
            errors: vec![],
        }
    );
    assert_eq!(test_app.measurements.count().await.unwrap(), 10);
}

#[tokio::test]
async fn forecast_trigger_twice_keeps_one_row() {
    let test_app = spawn_app(standard_keys()).await;

    for _ in 0..2 {
        let response = test_app
            .app
            .clone()
            .oneshot(post(
                "/api/forecast?tm1=2025091100&tm2=2025091112",
                Some("valid-key"),
            ))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::OK);
        let report = read_report(response).await;
        assert_eq!(report.status, "success");
        assert_eq!(report.count, 1);
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM forecast_summary")
        .fetch_one(test_app.database.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn empty_upstream_bodies_report_empty_response() {
    let test_app = spawn_app_with_hub(standard_keys(), "", "\n").await;

    for uri in [
        "/api/kma/fetch?tm1=202501010200&tm2=202501010300",
        "/api/forecast?tm1=202509110000&tm2=202509111200",
    ] {
        let response = test_app
            .app
            .clone()
            .oneshot(post(uri, Some("valid-key")))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::OK);

        let report = read_report(response).await;
        assert_eq!(report.status, "empty_response", "{}", uri);
        assert_eq!(report.code, 200);
        assert_eq!(report.count, 0);
    }
}

#[tokio::test]
async fn empty_bulletin_list_reports_no_data() {
    let test_app =
        spawn_app_with_hub(standard_keys(), "", "#START7777{fct_afs_ds:[]}#7777END").await;

    let response = test_app
        .app
        .clone()
        .oneshot(post(
            "/api/forecast?tm1=202509110000&tm2=202509111200",
            Some("valid-key"),
        ))
        .await
        .expect("Failed to execute request.");

    let report = read_report(response).await;
    assert_eq!(report.status, "no_data_found");
    assert_eq!(report.code, 204);
}

#[tokio::test]
async fn malformed_window_is_a_bad_request() {
    let test_app = spawn_app(standard_keys()).await;

    for uri in [
        "/api/kma/fetch?tm1=2025-01-01&tm2=202501010300",
        "/api/kma/fetch?tm1=202501010200&tm2=123",
        "/api/forecast?tm1=2025091100",
    ] {
        let response = test_app
            .app
            .clone()
            .oneshot(post(uri, Some("valid-key")))
            .await
            .expect("Failed to execute request.");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
    assert_eq!(test_app.measurements.count().await.unwrap(), 0);
}
