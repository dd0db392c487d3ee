use std::sync::Arc;

use anyhow::Context;
use log::{info, warn};
use time::Duration;

use crate::{
    Database, DuckDbMeasurementStore, ForecastClient, ForecastService, HttpFetcher,
    IngestionJob, KmaArgs, KmaEndpoint, MeasurementQuery, ObservationClient, ObservationService,
    Scheduler, TextFetcher, WindowClock,
};

/// Everything the two ingestion flows need, wired once at startup.
pub struct Pipeline {
    pub database: Arc<Database>,
    pub measurements: Arc<DuckDbMeasurementStore>,
    pub observations: Arc<ObservationService>,
    pub forecasts: Arc<ForecastService>,
    pub queries: Arc<MeasurementQuery>,
}

impl Pipeline {
    /// Open the time-series store, seed the sensor catalog and build both services.
    pub async fn build(args: &KmaArgs, database: Arc<Database>) -> anyhow::Result<Self> {
        if args.auth_key().is_empty() {
            warn!("no KMA auth key configured; upstream requests will be rejected");
        }

        let measurements = Arc::new(
            DuckDbMeasurementStore::open(&args.duckdb_path(), &args.measurement_table())
                .context("failed to open measurement store")?,
        );
        let sensors = database
            .seed_sensor_catalog(&args.station())
            .await
            .context("failed to seed sensor catalog")?;
        info!("{} sensors registered", sensors.len());

        let fetcher = Arc::new(
            HttpFetcher::new(&args.user_agent(), args.http_timeout())
                .context("failed to build http client")?,
        );
        Ok(Self::from_parts(args, database, measurements, fetcher))
    }

    pub fn from_parts(
        args: &KmaArgs,
        database: Arc<Database>,
        measurements: Arc<DuckDbMeasurementStore>,
        fetcher: Arc<dyn TextFetcher>,
    ) -> Self {
        let observations = ObservationService::new(
            ObservationClient::new(
                fetcher.clone(),
                KmaEndpoint::new(args.obs_url(), args.station(), args.auth_key()),
            ),
            measurements.clone(),
        );
        let forecasts = ForecastService::new(
            ForecastClient::new(
                fetcher,
                KmaEndpoint::new(args.fct_url(), args.station(), args.auth_key()),
            ),
            database.clone(),
        );
        let queries = MeasurementQuery::new(database.clone(), measurements.clone());

        Self {
            database,
            measurements,
            observations: Arc::new(observations),
            forecasts: Arc::new(forecasts),
            queries: Arc::new(queries),
        }
    }

    /// Observations trail one hour; forecasts trail their own cadence.
    pub fn scheduler(&self, args: &KmaArgs) -> Scheduler {
        let clock = WindowClock::default();
        let observation_job = IngestionJob::new(
            self.observations.clone(),
            args.observation_cadence(),
            clock,
        )
        .with_span(Duration::HOUR)
        .with_backfill(args.init_days());

        let forecast_cadence = args.forecast_cadence();
        let mut forecast_job = IngestionJob::new(self.forecasts.clone(), forecast_cadence, clock)
            .with_span(forecast_cadence.every);
        if args.forecast_backfill() {
            forecast_job = forecast_job.with_backfill(args.init_days());
        }

        let mut scheduler = Scheduler::new();
        scheduler.add(observation_job).add(forecast_job);
        scheduler
    }
}
