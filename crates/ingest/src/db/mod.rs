mod measurement_store;
mod sqlite;

use async_trait::async_trait;

use crate::{ForecastSummary, MeasurementPoint};

pub use measurement_store::*;
pub use sqlite::*;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Failed to query sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("Failed to run sqlite migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to query duckdb: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("Failed to format time string: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Failed to parse time string: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Database writer unavailable: {0}")]
    Writer(String),
}

/// Time-series destination for parsed observation points.
///
/// A point that repeats an existing (sensor, station, instant) replaces it.
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    async fn write(&self, points: &[MeasurementPoint]) -> Result<usize, StoreError>;
}

/// Relational destination for forecast bulletins, keyed by (tm_fc, stn_id).
#[async_trait]
pub trait ForecastSink: Send + Sync {
    async fn upsert(&self, record: &ForecastSummary) -> Result<(), StoreError>;
}
