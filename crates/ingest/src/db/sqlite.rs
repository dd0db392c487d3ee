use async_trait::async_trait;
use log::{error, info};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::{future::Future, path::Path, str::FromStr, time::Duration};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::{
    fs::create_dir_all,
    sync::{mpsc, oneshot},
};

use super::{ForecastSink, StoreError};
use crate::{ForecastSummary, KST, SENSOR_COLUMNS};

/// File name of the relational store inside the data directory.
pub const SQLITE_FILE: &str = "kma.sqlite";
const STATION_LOCATION_PREFIX: &str = "STN_";

type WriteOperation = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

/// Serializes writes onto a single task so concurrent ingestion runs never
/// fight over the SQLite write lock.
pub struct DatabaseWriter {
    write_tx: mpsc::UnboundedSender<WriteOperation>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Default for DatabaseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseWriter {
    pub fn new() -> Self {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteOperation>();

        let handle = tokio::spawn(async move {
            while let Some(future) = write_rx.recv().await {
                future.await;
            }
        });

        Self {
            write_tx,
            _handle: handle,
        }
    }

    pub async fn execute<T, F, Fut>(&self, pool: SqlitePool, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<Result<T, StoreError>>();

        let write_op = Box::pin(async move {
            let result = operation(pool).await;
            let _ = result_tx.send(result);
        });

        self.write_tx
            .send(write_op)
            .map_err(|_| StoreError::Writer(String::from("channel closed")))?;

        result_rx
            .await
            .map_err(|_| StoreError::Writer(String::from("write result dropped")))?
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorCatalogEntry {
    pub id: i64,
    pub name: String,
    pub unit: String,
    pub location: String,
}

impl SensorCatalogEntry {
    /// Station tag the sensor's samples carry, taken from its `STN_<id>` location.
    pub fn station(&self) -> &str {
        self.location
            .strip_prefix(STATION_LOCATION_PREFIX)
            .unwrap_or(&self.location)
    }
}

pub struct Database {
    pool: SqlitePool,
    writer: DatabaseWriter,
}

impl Database {
    /// Open (or create) `kma.sqlite` inside `dir` and run migrations.
    pub async fn new(dir: &str) -> Result<Self, StoreError> {
        let db_path = Path::new(dir).join(SQLITE_FILE);

        if let Some(parent) = db_path.parent() {
            create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Sqlite(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .pragma("journal_mode", "WAL")
            .pragma("synchronous", "NORMAL")
            .pragma("busy_timeout", "5000")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let db = Self::from_pool(pool).await?;
        info!("SQLite database initialized at: {}", db_path.display());
        Ok(db)
    }

    /// Private in-memory database; a single pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            writer: DatabaseWriter::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Checkpoint WAL to the main database file before shutdown.
    pub async fn checkpoint(&self) {
        match sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&self.pool)
            .await
        {
            Ok(_) => info!("WAL checkpoint completed successfully"),
            Err(e) => error!("WAL checkpoint failed: {}", e),
        }
    }

    /// Insert the sensor if no sensor with that name exists yet, then return it.
    pub async fn ensure_sensor(
        &self,
        name: &str,
        unit: &str,
        location: &str,
    ) -> Result<SensorCatalogEntry, StoreError> {
        let pool = self.pool.clone();
        let (name, unit, location) = (name.to_string(), unit.to_string(), location.to_string());

        self.writer
            .execute(pool, move |pool| async move {
                sqlx::query(
                    "INSERT INTO sensors (name, unit, location) VALUES (?, ?, ?)
                     ON CONFLICT(name) DO NOTHING",
                )
                .bind(&name)
                .bind(&unit)
                .bind(&location)
                .execute(&pool)
                .await?;

                let row = sqlx::query("SELECT id, name, unit, location FROM sensors WHERE name = ?")
                    .bind(&name)
                    .fetch_one(&pool)
                    .await?;
                Ok(sensor_from_row(&row)?)
            })
            .await
    }

    /// Register one catalog entry per observed quantity for `station`.
    pub async fn seed_sensor_catalog(
        &self,
        station: &str,
    ) -> Result<Vec<SensorCatalogEntry>, StoreError> {
        let location = format!("{}{}", STATION_LOCATION_PREFIX, station);
        let mut entries = Vec::with_capacity(SENSOR_COLUMNS.len());
        for column in SENSOR_COLUMNS.iter() {
            entries.push(
                self.ensure_sensor(column.name, column.unit, &location)
                    .await?,
            );
        }
        info!("sensor catalog ready: {} sensors for {}", entries.len(), location);
        Ok(entries)
    }

    pub async fn sensor_by_id(&self, id: i64) -> Result<Option<SensorCatalogEntry>, StoreError> {
        let row = sqlx::query("SELECT id, name, unit, location FROM sensors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(sensor_from_row).transpose()?)
    }

    pub async fn sensor_by_name(&self, name: &str) -> Result<Option<SensorCatalogEntry>, StoreError> {
        let row = sqlx::query("SELECT id, name, unit, location FROM sensors WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(sensor_from_row).transpose()?)
    }

    /// The whole catalog, by id.
    pub async fn sensors(&self) -> Result<Vec<SensorCatalogEntry>, StoreError> {
        let rows = sqlx::query("SELECT id, name, unit, location FROM sensors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(sensor_from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()?)
    }

    /// Bulletins of one station published within `[from, to]`.
    pub async fn forecasts_for_station(
        &self,
        stn_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<ForecastSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT tm_fc, stn_id, tm_in, cnt, man_fc, man_fc_id, man_in, man_in_id, man_ip,
                    wf_sv1, wf_sv2, wf_sv3, wn, wr, rem
             FROM forecast_summary
             WHERE stn_id = ? AND tm_fc >= ? AND tm_fc <= ?
             ORDER BY tm_fc",
        )
        .bind(stn_id)
        .bind(to_db_time(from)?)
        .bind(to_db_time(to)?)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(forecast_from_row).collect()
    }
}

#[async_trait]
impl ForecastSink for Database {
    async fn upsert(&self, record: &ForecastSummary) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let record = record.clone();
        let tm_fc = to_db_time(record.tm_fc)?;
        let tm_in = record.tm_in.map(to_db_time).transpose()?;

        self.writer
            .execute(pool, move |pool| async move {
                sqlx::query(
                    "INSERT INTO forecast_summary (
                        tm_fc, stn_id, tm_in, cnt, man_fc, man_fc_id, man_in, man_in_id, man_ip,
                        wf_sv1, wf_sv2, wf_sv3, wn, wr, rem
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(tm_fc, stn_id) DO UPDATE SET
                        tm_in = excluded.tm_in,
                        cnt = excluded.cnt,
                        man_fc = excluded.man_fc,
                        man_fc_id = excluded.man_fc_id,
                        man_in = excluded.man_in,
                        man_in_id = excluded.man_in_id,
                        man_ip = excluded.man_ip,
                        wf_sv1 = excluded.wf_sv1,
                        wf_sv2 = excluded.wf_sv2,
                        wf_sv3 = excluded.wf_sv3,
                        wn = excluded.wn,
                        wr = excluded.wr,
                        rem = excluded.rem,
                        updated_at = CURRENT_TIMESTAMP",
                )
                .bind(&tm_fc)
                .bind(record.stn_id)
                .bind(&tm_in)
                .bind(record.cnt)
                .bind(&record.man_fc)
                .bind(&record.man_fc_id)
                .bind(&record.man_in)
                .bind(&record.man_in_id)
                .bind(&record.man_ip)
                .bind(&record.wf_sv1)
                .bind(&record.wf_sv2)
                .bind(&record.wf_sv3)
                .bind(&record.wn)
                .bind(&record.wr)
                .bind(&record.rem)
                .execute(&pool)
                .await?;
                Ok(())
            })
            .await
    }
}

/// Bulletin instants are stored as RFC 3339 text in KST so that text order
/// matches time order and the unique key compares equal across runs.
fn to_db_time(at: OffsetDateTime) -> Result<String, StoreError> {
    Ok(at.to_offset(KST).format(&Rfc3339)?)
}

fn from_db_time(value: &str) -> Result<OffsetDateTime, StoreError> {
    Ok(OffsetDateTime::parse(value, &Rfc3339)?)
}

fn sensor_from_row(row: &SqliteRow) -> Result<SensorCatalogEntry, sqlx::Error> {
    Ok(SensorCatalogEntry {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        unit: row.try_get("unit")?,
        location: row.try_get("location")?,
    })
}

fn forecast_from_row(row: &SqliteRow) -> Result<ForecastSummary, StoreError> {
    let tm_fc: String = row.try_get("tm_fc")?;
    let tm_in: Option<String> = row.try_get("tm_in")?;

    Ok(ForecastSummary {
        tm_fc: from_db_time(&tm_fc)?,
        stn_id: row.try_get("stn_id")?,
        tm_in: tm_in.as_deref().map(from_db_time).transpose()?,
        cnt: row.try_get("cnt")?,
        man_fc: row.try_get("man_fc")?,
        man_fc_id: row.try_get("man_fc_id")?,
        man_in: row.try_get("man_in")?,
        man_in_id: row.try_get("man_in_id")?,
        man_ip: row.try_get("man_ip")?,
        wf_sv1: row.try_get("wf_sv1")?,
        wf_sv2: row.try_get("wf_sv2")?,
        wf_sv3: row.try_get("wf_sv3")?,
        wn: row.try_get("wn")?,
        wr: row.try_get("wr")?,
        rem: row.try_get("rem")?,
    })
}
