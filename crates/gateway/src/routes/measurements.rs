use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use kma_ingest::{QueryError, SensorReading, KST};
use log::{error, info};
use serde::{Deserialize, Serialize};
use time::{
    format_description::{well_known::Rfc3339, BorrowedFormatItem},
    macros::format_description,
    Duration, OffsetDateTime, PrimitiveDateTime,
};

use crate::{AppState, AuthenticatedKey};

pub const DEFAULT_LOOKBACK_SECS: u64 = 86_400;

const LOCAL_DATE_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const LOCAL_DATE_TIME_MINUTES: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]");

/// Trailing lookback ending now.
#[derive(Debug, Deserialize)]
pub struct LookbackParams {
    pub duration_sec: Option<u64>,
}

impl LookbackParams {
    fn range(&self) -> Result<(OffsetDateTime, OffsetDateTime), (StatusCode, String)> {
        let secs = self.duration_sec.unwrap_or(DEFAULT_LOOKBACK_SECS);
        let now = OffsetDateTime::now_utc().to_offset(KST);
        let from = i64::try_from(secs)
            .ok()
            .and_then(|secs| now.checked_sub(Duration::seconds(secs)))
            .ok_or((
                StatusCode::BAD_REQUEST,
                format!("duration_sec {} is out of range", secs),
            ))?;
        Ok((from, now))
    }
}

/// `[start, end)` as local KST date-times, `YYYY-MM-DDTHH:mm[:ss]`.
#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub start: String,
    pub end: String,
}

impl RangeParams {
    fn range(&self) -> Result<(OffsetDateTime, OffsetDateTime), (StatusCode, String)> {
        Ok((
            parse_local(&self.start, "start")?,
            parse_local(&self.end, "end")?,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct NamedRangeParams {
    pub sensor_name: String,
    pub start: String,
    pub end: String,
}

fn parse_local(value: &str, name: &str) -> Result<OffsetDateTime, (StatusCode, String)> {
    PrimitiveDateTime::parse(value, LOCAL_DATE_TIME)
        .or_else(|_| PrimitiveDateTime::parse(value, LOCAL_DATE_TIME_MINUTES))
        .map(|local| local.assume_offset(KST))
        .map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                format!("{} must look like 2025-01-01T00:00:00", name),
            )
        })
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ReadingReport {
    pub sensor_id: i64,
    /// `null` for samples the upstream reported as non-numeric.
    pub value: Option<f64>,
    pub sensing_date: String,
}

fn report(readings: Vec<SensorReading>) -> Result<Vec<ReadingReport>, (StatusCode, String)> {
    readings
        .into_iter()
        .map(|reading| {
            let sensing_date = reading
                .observed_at
                .to_offset(KST)
                .format(&Rfc3339)
                .map_err(|e| {
                    error!("error formatting sample time: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, String::from("internal error"))
                })?;
            Ok(ReadingReport {
                sensor_id: reading.sensor_id,
                value: reading.value.is_finite().then_some(reading.value),
                sensing_date,
            })
        })
        .collect::<Result<Vec<_>, (StatusCode, String)>>()
}

fn query_error(e: QueryError) -> (StatusCode, String) {
    match e {
        QueryError::UnknownSensorId(_) | QueryError::UnknownSensorName(_) => {
            (StatusCode::NOT_FOUND, e.to_string())
        }
        QueryError::EmptyRange => (StatusCode::BAD_REQUEST, e.to_string()),
        QueryError::Store(e) => {
            error!("error reading measurements: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::from("internal error"))
        }
    }
}

/// Readings of one catalog sensor over the trailing `duration_sec`.
pub async fn measurements_by_id(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedKey>,
    Path(sensor_id): Path<i64>,
    Query(params): Query<LookbackParams>,
) -> Result<Json<Vec<ReadingReport>>, (StatusCode, String)> {
    let (from, to) = params.range()?;
    info!("measurements of sensor {} since {} for {}", sensor_id, from, caller.owner);

    let readings = state
        .measurements
        .by_id(sensor_id, from, to)
        .await
        .map_err(query_error)?;
    Ok(Json(report(readings)?))
}

/// Readings of one sensor, by tag, over the trailing `duration_sec`.
pub async fn measurements_by_name(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedKey>,
    Path(sensor_name): Path<String>,
    Query(params): Query<LookbackParams>,
) -> Result<Json<Vec<ReadingReport>>, (StatusCode, String)> {
    let (from, to) = params.range()?;
    info!("measurements of {} since {} for {}", sensor_name, from, caller.owner);

    let readings = state
        .measurements
        .by_name(&sensor_name, from, to)
        .await
        .map_err(query_error)?;
    Ok(Json(report(readings)?))
}

pub async fn measurements_between(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedKey>,
    Query(params): Query<NamedRangeParams>,
) -> Result<Json<Vec<ReadingReport>>, (StatusCode, String)> {
    let (from, to) = (
        parse_local(&params.start, "start")?,
        parse_local(&params.end, "end")?,
    );
    info!(
        "measurements of {} in [{}, {}) for {}",
        params.sensor_name, from, to, caller.owner
    );

    let readings = state
        .measurements
        .by_name(&params.sensor_name, from, to)
        .await
        .map_err(query_error)?;
    Ok(Json(report(readings)?))
}

/// Every sensor's readings in the range, keyed by sensor name.
pub async fn measurements_grouped(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedKey>,
    Query(params): Query<RangeParams>,
) -> Result<Json<BTreeMap<String, Vec<ReadingReport>>>, (StatusCode, String)> {
    let (from, to) = params.range()?;
    info!("grouped measurements in [{}, {}) for {}", from, to, caller.owner);

    let grouped = state
        .measurements
        .grouped(from, to)
        .await
        .map_err(query_error)?;
    grouped
        .into_iter()
        .map(|(name, readings)| Ok((name, report(readings)?)))
        .collect::<Result<BTreeMap<_, _>, (StatusCode, String)>>()
        .map(Json)
}
