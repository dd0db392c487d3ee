use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use duckdb::{params, Connection};
use kma_core::ensure_dir_exists;
use log::{debug, info};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

use super::{MeasurementSink, StoreError};
use crate::MeasurementPoint;

pub const DEFAULT_MEASUREMENT_TABLE: &str = "sensor_data";

const SAMPLE_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// DuckDB-backed time-series store.
///
/// Samples are keyed by (sensor, station, observed_at); the instant is kept in UTC.
pub struct DuckDbMeasurementStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl DuckDbMeasurementStore {
    pub fn open(path: &str, table: &str) -> Result<Self, StoreError> {
        ensure_dir_exists(path);
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn, table)?;
        info!("DuckDB measurement store opened at: {} (table {})", path, table);
        Ok(store)
    }

    pub fn in_memory(table: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                sensor VARCHAR NOT NULL,
                station VARCHAR NOT NULL,
                observed_at TIMESTAMP NOT NULL,
                value DOUBLE,
                PRIMARY KEY (sensor, station, observed_at)
            );"
        ))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.clone();
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await?
    }

    /// Samples of one sensor at one station observed in `[from, to)`, oldest first.
    pub async fn points_between(
        &self,
        sensor: &str,
        station: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<MeasurementPoint>, StoreError> {
        let conn = self.conn.clone();
        let sql = format!(
            "SELECT sensor, station, strftime(observed_at, '%Y-%m-%d %H:%M:%S'), value
             FROM {}
             WHERE sensor = ? AND station = ?
               AND observed_at >= CAST(? AS TIMESTAMP) AND observed_at < CAST(? AS TIMESTAMP)
             ORDER BY observed_at",
            self.table
        );
        let (sensor, station) = (sensor.to_string(), station.to_string());
        let (from, to) = (sample_time(from)?, sample_time(to)?);

        tokio::task::spawn_blocking(move || -> Result<Vec<MeasurementPoint>, StoreError> {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![sensor, station, from, to], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            })?;

            let mut points = Vec::new();
            for row in rows {
                let (sensor, station, observed_at, value) = row?;
                points.push(MeasurementPoint {
                    sensor,
                    station,
                    value: value.unwrap_or(f64::NAN),
                    observed_at: PrimitiveDateTime::parse(&observed_at, SAMPLE_TIME_FORMAT)?
                        .assume_utc(),
                });
            }
            Ok(points)
        })
        .await?
    }
}

#[async_trait]
impl MeasurementSink for DuckDbMeasurementStore {
    async fn write(&self, points: &[MeasurementPoint]) -> Result<usize, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }

        let rows = points
            .iter()
            .map(|point| {
                Ok((
                    point.sensor.clone(),
                    point.station.clone(),
                    sample_time(point.observed_at)?,
                    point.value,
                ))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        let conn = self.conn.clone();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (sensor, station, observed_at, value)
             VALUES (?, ?, CAST(? AS TIMESTAMP), ?)",
            self.table
        );

        let written = tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for (sensor, station, observed_at, value) in &rows {
                    stmt.execute(params![sensor, station, observed_at, value])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await??;

        debug!("wrote {} samples", written);
        Ok(written)
    }
}

fn sample_time(at: OffsetDateTime) -> Result<String, StoreError> {
    Ok(at.to_offset(UtcOffset::UTC).format(SAMPLE_TIME_FORMAT)?)
}

fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}
