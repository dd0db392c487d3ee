use crate::{
    fetch_forecasts, fetch_observations, health, measurements_between, measurements_by_id,
    measurements_by_name, measurements_grouped, rate_limit_gate, ApiKeyStore, Cli, RateLimiter,
    SqliteApiKeyStore,
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use hyper::{
    header::{HeaderName, ACCEPT, CONTENT_TYPE},
    Method,
};
use kma_ingest::{Database, MeasurementQuery, Pipeline, RecurringTask};
use log::info;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub observations: Arc<dyn RecurringTask>,
    pub forecasts: Arc<dyn RecurringTask>,
    pub measurements: Arc<MeasurementQuery>,
}

impl AppState {
    pub fn new(
        database: Arc<Database>,
        api_keys: Arc<dyn ApiKeyStore>,
        observations: Arc<dyn RecurringTask>,
        forecasts: Arc<dyn RecurringTask>,
        measurements: Arc<MeasurementQuery>,
    ) -> Self {
        Self {
            database,
            api_keys,
            rate_limiter: Arc::new(RateLimiter::new()),
            observations,
            forecasts,
            measurements,
        }
    }
}

/// Open both stores, provision configured API keys and wire the ingestion services.
pub async fn build_app_state(cli: &Cli) -> Result<(AppState, Pipeline), anyhow::Error> {
    let database = Arc::new(
        Database::new(&cli.kma.data_dir())
            .await
            .map_err(|e| anyhow!("error setting up SQLite database: {}", e))?,
    );

    let api_keys = SqliteApiKeyStore::new(database.pool().clone());
    let seeded = api_keys
        .seed(&cli.api_keys)
        .await
        .map_err(|e| anyhow!("error provisioning api keys: {}", e))?;
    info!("{} api keys provisioned from config", seeded);

    let pipeline = Pipeline::build(&cli.kma, database.clone()).await?;
    let state = AppState::new(
        database,
        Arc::new(api_keys),
        pipeline.observations.clone(),
        pipeline.forecasts.clone(),
        pipeline.queries.clone(),
    );
    Ok((state, pipeline))
}

pub fn app(app_state: AppState) -> Router {
    let state = Arc::new(app_state);
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, HeaderName::from_static("x-api-key")])
        .allow_origin(Any);

    let gated = Router::new()
        .route("/api/kma/fetch", post(fetch_observations))
        .route("/api/forecast", post(fetch_forecasts))
        .route("/api/measurements/list", get(measurements_between))
        .route("/api/measurements/list/grouped", get(measurements_grouped))
        .route("/api/measurements/by-name/{sensor_name}", get(measurements_by_name))
        .route("/api/measurements/{sensor_id}", get(measurements_by_id))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_gate));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .with_state(state)
        .layer(middleware::from_fn(log_request))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}
