use std::time::Duration;

use async_trait::async_trait;
use kma_core::mask_secret;
use log::debug;
use reqwest::{Client, StatusCode};

/// Query parameter that carries the KMA hub credential.
pub const AUTH_PARAM: &str = "authKey";

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("error building http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("error sending request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream responded with status {0}")]
    Status(StatusCode),
}

/// Where one KMA API hub report lives and whom to ask it for.
#[derive(Clone)]
pub struct KmaEndpoint {
    pub base_url: String,
    pub station: String,
    pub auth_key: String,
}

impl KmaEndpoint {
    pub fn new(
        base_url: impl Into<String>,
        station: impl Into<String>,
        auth_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            station: station.into(),
            auth_key: auth_key.into(),
        }
    }
}

impl std::fmt::Debug for KmaEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmaEndpoint")
            .field("base_url", &self.base_url)
            .field("station", &self.station)
            .field("auth_key", &mask_secret(&self.auth_key))
            .finish()
    }
}

/// Issues one GET and hands back the raw body.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    async fn fetch_text(&self, base_url: &str, query: &[(&str, &str)]) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TextFetcher for HttpFetcher {
    async fn fetch_text(&self, base_url: &str, query: &[(&str, &str)]) -> Result<String, FetchError> {
        debug!("requesting: {}", loggable_url(base_url, query));
        let response = self.client.get(base_url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.text().await?)
    }
}

/// Render a request URL for logs with the credential masked.
pub fn loggable_url(base_url: &str, query: &[(&str, &str)]) -> String {
    let params: Vec<String> = query
        .iter()
        .map(|(name, value)| {
            if *name == AUTH_PARAM {
                format!("{}={}", name, mask_secret(value))
            } else {
                format!("{}={}", name, value)
            }
        })
        .collect();
    format!("{}?{}", base_url, params.join("&"))
}
