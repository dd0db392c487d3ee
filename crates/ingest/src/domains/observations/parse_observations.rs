use time::OffsetDateTime;

use crate::{parse_stamp, StampError, KST};

/// Minimum whitespace-separated fields in a data line.
pub const MIN_FIELDS: usize = 16;

/// A physical quantity read from a fixed column of the surface report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorColumn {
    pub name: &'static str,
    pub column: usize,
    pub unit: &'static str,
}

/// Column layout of the hourly surface report (`TM STN WD WS ... PA ... TA ... RN`).
pub const SENSOR_COLUMNS: [SensorColumn; 5] = [
    SensorColumn {
        name: "wind_dir",
        column: 2,
        unit: "16방위",
    },
    SensorColumn {
        name: "wind_speed",
        column: 3,
        unit: "m/s",
    },
    SensorColumn {
        name: "pressure",
        column: 7,
        unit: "hPa",
    },
    SensorColumn {
        name: "temperature",
        column: 11,
        unit: "℃",
    },
    SensorColumn {
        name: "rainfall",
        column: 15,
        unit: "mm",
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPoint {
    pub sensor: String,
    pub station: String,
    /// NaN when the upstream token was not a number.
    pub value: f64,
    pub observed_at: OffsetDateTime,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ObservationLineError {
    #[error("line {line_no}: expected at least {} fields, found {found}", MIN_FIELDS)]
    TooFewFields { line_no: usize, found: usize },
    #[error("line {line_no}: {source}")]
    Timestamp {
        line_no: usize,
        #[source]
        source: StampError,
    },
}

/// Everything recovered from one observation body.
#[derive(Debug, Default)]
pub struct ObservationBatch {
    /// Data lines that produced points.
    pub records: usize,
    pub points: Vec<MeasurementPoint>,
    pub errors: Vec<ObservationLineError>,
}

/// Parse a whole report body, skipping comment and blank lines.
///
/// Lines that fail are collected in `errors`; the remaining lines are still parsed.
pub fn parse_observations(body: &str) -> ObservationBatch {
    let mut batch = ObservationBatch::default();

    for (index, line) in body.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_observation_line(index + 1, trimmed) {
            Ok(points) => {
                batch.records += 1;
                batch.points.extend(points);
            }
            Err(err) => batch.errors.push(err),
        }
    }

    batch
}

/// Parse one data line into one point per entry of [`SENSOR_COLUMNS`].
pub fn parse_observation_line(
    line_no: usize,
    line: &str,
) -> Result<Vec<MeasurementPoint>, ObservationLineError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return Err(ObservationLineError::TooFewFields {
            line_no,
            found: fields.len(),
        });
    }

    let observed_at = parse_stamp(fields[0], KST)
        .map_err(|source| ObservationLineError::Timestamp { line_no, source })?;
    let station = fields[1];

    Ok(SENSOR_COLUMNS
        .iter()
        .map(|sensor| MeasurementPoint {
            sensor: sensor.name.to_string(),
            station: station.to_string(),
            value: parse_value(fields[sensor.column]),
            observed_at,
        })
        .collect())
}

fn parse_value(token: &str) -> f64 {
    token.parse::<f64>().unwrap_or(f64::NAN)
}
