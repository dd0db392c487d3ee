use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::{
    parse_observations, FetchError, KmaEndpoint, MeasurementSink, RecurringTask, RunOutcome,
    TextFetcher, TimeWindow, AUTH_PARAM,
};

/// Hourly surface observation report (`kma_sfctm3.php`).
pub struct ObservationClient {
    fetcher: Arc<dyn TextFetcher>,
    endpoint: KmaEndpoint,
}

impl ObservationClient {
    pub fn new(fetcher: Arc<dyn TextFetcher>, endpoint: KmaEndpoint) -> Self {
        Self { fetcher, endpoint }
    }

    pub async fn fetch(&self, window: &TimeWindow) -> Result<String, FetchError> {
        let query = [
            ("stn", self.endpoint.station.as_str()),
            ("tm1", window.start.as_str()),
            ("tm2", window.end.as_str()),
            (AUTH_PARAM, self.endpoint.auth_key.as_str()),
        ];
        self.fetcher
            .fetch_text(&self.endpoint.base_url, &query)
            .await
    }
}

pub struct ObservationService {
    client: ObservationClient,
    sink: Arc<dyn MeasurementSink>,
}

impl ObservationService {
    pub fn new(client: ObservationClient, sink: Arc<dyn MeasurementSink>) -> Self {
        Self { client, sink }
    }

    /// Fetch one window, parse it and write every point. `count` is the number
    /// of report lines that made it into the store.
    pub async fn fetch_and_store(&self, window: &TimeWindow) -> RunOutcome {
        let body = match self.client.fetch(window).await {
            Ok(body) => body,
            Err(e) => return RunOutcome::processing_error(0, e),
        };
        if body.trim().is_empty() {
            warn!("observation response for {} was empty", window);
            return RunOutcome::empty_response();
        }

        let batch = parse_observations(&body);
        for err in &batch.errors {
            warn!("skipping observation {}", err);
        }

        match self.sink.write(&batch.points).await {
            Ok(written) => {
                info!(
                    "stored {} observation lines ({} samples) for {}",
                    batch.records, written, window
                );
                RunOutcome::success(batch.records).with_errors(&batch.errors)
            }
            Err(e) => RunOutcome::processing_error(0, e).with_errors(&batch.errors),
        }
    }
}

#[async_trait]
impl RecurringTask for ObservationService {
    fn name(&self) -> &str {
        "observations"
    }

    async fn run(&self, window: &TimeWindow) -> RunOutcome {
        self.fetch_and_store(window).await
    }
}
