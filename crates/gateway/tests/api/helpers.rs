use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response},
    Router,
};
use kma_gateway::{
    app, ApiKeyCredential, ApiKeyStore, ApiKeyStoreError, AppState, RunReport, API_KEY_HEADER,
};
use kma_ingest::{Database, DuckDbMeasurementStore, FetchError, KmaArgs, Pipeline, TextFetcher};
use mockall::mock;
use serde::de::DeserializeOwned;
use std::sync::Arc;

mock! {
    pub ApiKeys {}
    #[async_trait]
    impl ApiKeyStore for ApiKeys {
        async fn find(&self, api_key: &str) -> Result<Option<ApiKeyCredential>, ApiKeyStoreError>;
    }
}

pub const OBS_URL: &str = "http://kma.test/kma_sfctm3.php";
pub const FCT_URL: &str = "http://kma.test/fct_afs_ds.php";

pub const OBSERVATION_REPORT: &str = "#START7777\n\
    # YYMMDDHHMI STN  WD   WS\n\
    202501010200 108 10 2.1 0 0 0 995.3 0 0 0 12.3 0 0 0 0.0\n\
    202501010300 108 12 1.4 0 0 0 995.1 0 0 0 11.8 0 0 0 0.5\n\
    #7777END\n";

pub const FORECAST_BULLETINS: &str =
    r#"#START7777{fct_afs_ds:[{stn_id:108,tm_fc:"2025.09.11.06:00",wf_sv1:"clear"}]}#7777END"#;

/// Answers each upstream endpoint with a fixed body.
pub struct CannedHub {
    pub observations: String,
    pub forecasts: String,
}

#[async_trait]
impl TextFetcher for CannedHub {
    async fn fetch_text(&self, base_url: &str, _query: &[(&str, &str)]) -> Result<String, FetchError> {
        match base_url {
            OBS_URL => Ok(self.observations.clone()),
            _ => Ok(self.forecasts.clone()),
        }
    }
}

pub struct TestApp {
    pub app: Router,
    pub database: Arc<Database>,
    pub measurements: Arc<DuckDbMeasurementStore>,
}

pub fn credential(api_key: &str, limit_per_minute: u32, active: bool) -> ApiKeyCredential {
    ApiKeyCredential {
        api_key: api_key.to_string(),
        owner: format!("owner-of-{}", api_key),
        limit_per_minute,
        active,
    }
}

/// Keys known to [`standard_keys`].
pub fn known_key(api_key: &str) -> Option<ApiKeyCredential> {
    match api_key {
        "valid-key" => Some(credential("valid-key", 100, true)),
        "tight-key" => Some(credential("tight-key", 2, true)),
        "retired-key" => Some(credential("retired-key", 100, false)),
        _ => None,
    }
}

pub fn standard_keys() -> MockApiKeys {
    let mut api_keys = MockApiKeys::new();
    api_keys
        .expect_find()
        .returning(|api_key| Ok(known_key(api_key)));
    api_keys
}

pub async fn spawn_app(api_keys: MockApiKeys) -> TestApp {
    spawn_app_with_hub(api_keys, OBSERVATION_REPORT, FORECAST_BULLETINS).await
}

pub async fn spawn_app_with_hub(
    api_keys: MockApiKeys,
    observations: &str,
    forecasts: &str,
) -> TestApp {
    let args = KmaArgs {
        obs_url: Some(OBS_URL.to_string()),
        fct_url: Some(FCT_URL.to_string()),
        auth_key: Some(String::from("test-auth-key")),
        ..Default::default()
    };
    let database = Arc::new(Database::in_memory().await.unwrap());
    database.seed_sensor_catalog(&args.station()).await.unwrap();
    let measurements = Arc::new(DuckDbMeasurementStore::in_memory("sensor_data").unwrap());
    let hub = Arc::new(CannedHub {
        observations: observations.to_string(),
        forecasts: forecasts.to_string(),
    });
    let pipeline = Pipeline::from_parts(&args, database.clone(), measurements.clone(), hub);

    let state = AppState::new(
        database.clone(),
        Arc::new(api_keys),
        pipeline.observations.clone(),
        pipeline.forecasts.clone(),
        pipeline.queries.clone(),
    );

    TestApp {
        app: app(state),
        database,
        measurements,
    }
}

pub fn post(uri: &str, api_key: Option<&str>) -> Request<Body> {
    request(Method::POST, uri, api_key)
}

pub fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, api_key)
}

fn request(method: Method, uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(api_key) = api_key {
        builder = builder.header(API_KEY_HEADER, api_key);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn read_report(response: Response<Body>) -> RunReport {
    read_json(response).await
}

pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
