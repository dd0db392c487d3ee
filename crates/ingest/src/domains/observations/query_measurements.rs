use std::{collections::BTreeMap, sync::Arc};

use log::debug;
use time::OffsetDateTime;

use crate::{Database, DuckDbMeasurementStore, SensorCatalogEntry, StoreError};

/// One stored sample, addressed by its catalog id.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub sensor_id: i64,
    /// NaN when the upstream token was not a number.
    pub value: f64,
    pub observed_at: OffsetDateTime,
}

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("no sensor with id {0}")]
    UnknownSensorId(i64),
    #[error("no sensor named {0:?}")]
    UnknownSensorName(String),
    #[error("range start must be before its end")]
    EmptyRange,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reads samples back out of the time-series store, translating between the
/// catalog's numeric ids and the sensor tags the samples are written with.
pub struct MeasurementQuery {
    database: Arc<Database>,
    measurements: Arc<DuckDbMeasurementStore>,
}

impl MeasurementQuery {
    pub fn new(database: Arc<Database>, measurements: Arc<DuckDbMeasurementStore>) -> Self {
        Self {
            database,
            measurements,
        }
    }

    pub async fn by_id(
        &self,
        sensor_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<SensorReading>, QueryError> {
        let sensor = self
            .database
            .sensor_by_id(sensor_id)
            .await?
            .ok_or(QueryError::UnknownSensorId(sensor_id))?;
        self.readings(&sensor, from, to).await
    }

    pub async fn by_name(
        &self,
        name: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<SensorReading>, QueryError> {
        let sensor = self
            .database
            .sensor_by_name(name)
            .await?
            .ok_or_else(|| QueryError::UnknownSensorName(name.to_string()))?;
        self.readings(&sensor, from, to).await
    }

    /// Every catalog sensor's readings in the range, keyed by sensor name.
    pub async fn grouped(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<BTreeMap<String, Vec<SensorReading>>, QueryError> {
        let mut grouped = BTreeMap::new();
        for sensor in self.database.sensors().await? {
            let readings = self.readings(&sensor, from, to).await?;
            grouped.insert(sensor.name, readings);
        }
        Ok(grouped)
    }

    async fn readings(
        &self,
        sensor: &SensorCatalogEntry,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<SensorReading>, QueryError> {
        if from >= to {
            return Err(QueryError::EmptyRange);
        }
        let points = self
            .measurements
            .points_between(&sensor.name, sensor.station(), from, to)
            .await?;
        debug!("{} readings of {} in [{}, {})", points.len(), sensor.name, from, to);

        Ok(points
            .into_iter()
            .map(|point| SensorReading {
                sensor_id: sensor.id,
                value: point.value,
                observed_at: point.observed_at,
            })
            .collect())
    }
}
