use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::{
    parse_bulletins, BulletinPayload, FetchError, ForecastSink, KmaEndpoint, RecurringTask,
    RunOutcome, TextFetcher, TimeWindow, AUTH_PARAM,
};

/// Short-range forecast overview bulletins (`fct_afs_ds.php`), queried by publication time.
pub struct ForecastClient {
    fetcher: Arc<dyn TextFetcher>,
    endpoint: KmaEndpoint,
}

impl ForecastClient {
    pub fn new(fetcher: Arc<dyn TextFetcher>, endpoint: KmaEndpoint) -> Self {
        Self { fetcher, endpoint }
    }

    pub async fn fetch(&self, window: &TimeWindow) -> Result<String, FetchError> {
        let query = [
            ("stn", self.endpoint.station.as_str()),
            ("tmfc1", window.start.as_str()),
            ("tmfc2", window.end.as_str()),
            ("disp", "1"),
            (AUTH_PARAM, self.endpoint.auth_key.as_str()),
        ];
        self.fetcher
            .fetch_text(&self.endpoint.base_url, &query)
            .await
    }
}

pub struct ForecastService {
    client: ForecastClient,
    sink: Arc<dyn ForecastSink>,
}

impl ForecastService {
    pub fn new(client: ForecastClient, sink: Arc<dyn ForecastSink>) -> Self {
        Self { client, sink }
    }

    pub async fn fetch_and_store(&self, window: &TimeWindow) -> RunOutcome {
        let body = match self.client.fetch(window).await {
            Ok(body) => body,
            Err(e) => return RunOutcome::processing_error(0, e),
        };
        if body.trim().is_empty() {
            warn!("forecast response for {} was empty", window);
            return RunOutcome::empty_response();
        }

        let batch = match parse_bulletins(&body) {
            Ok(BulletinPayload::Batch(batch)) => batch,
            Ok(BulletinPayload::NoData) => {
                warn!("no forecast bulletins published in {}", window);
                return RunOutcome::no_data();
            }
            Err(e) => return RunOutcome::processing_error(0, e),
        };
        for err in &batch.errors {
            warn!("skipping forecast {}", err);
        }

        let mut stored = 0;
        for record in &batch.records {
            // a failing store aborts the run; what was upserted so far stays
            if let Err(e) = self.sink.upsert(record).await {
                return RunOutcome::processing_error(stored, e).with_errors(&batch.errors);
            }
            stored += 1;
        }

        info!("stored {} forecast bulletins for {}", stored, window);
        RunOutcome::success(stored).with_errors(&batch.errors)
    }
}

#[async_trait]
impl RecurringTask for ForecastService {
    fn name(&self) -> &str {
        "forecasts"
    }

    async fn run(&self, window: &TimeWindow) -> RunOutcome {
        self.fetch_and_store(window).await
    }
}
