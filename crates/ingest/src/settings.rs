use std::fmt;

use clap::Args;
use kma_core::mask_secret;
use time::Duration;

use crate::{Cadence, DEFAULT_MEASUREMENT_TABLE};

pub const DEFAULT_OBSERVATION_URL: &str = "https://apihub.kma.go.kr/api/typ01/url/kma_sfctm3.php";
pub const DEFAULT_FORECAST_URL: &str = "https://apihub.kma.go.kr/api/typ01/url/fct_afs_ds.php";
pub const DEFAULT_STATION: &str = "108";
pub const DEFAULT_INIT_DAYS: u32 = 31;

/// Settings for talking to the KMA API hub and storing what comes back.
#[derive(Args, Clone, serde::Deserialize, Default)]
pub struct KmaArgs {
    /// Hourly surface observation endpoint
    #[arg(long, env = "KMA_OBS_URL")]
    pub obs_url: Option<String>,

    /// Forecast overview bulletin endpoint
    #[arg(long, env = "KMA_FCT_URL")]
    pub fct_url: Option<String>,

    /// API hub auth key, sent as `authKey`
    #[arg(long, env = "KMA_AUTH_KEY", hide_env_values = true)]
    pub auth_key: Option<String>,

    /// Station id to ingest (108 = Seoul)
    #[arg(long, env = "KMA_STATION")]
    pub station: Option<String>,

    /// Days of history to backfill at startup
    #[arg(long, env = "KMA_INIT_DAYS")]
    pub init_days: Option<u32>,

    /// Also backfill forecast bulletins at startup
    #[arg(long, env = "KMA_FORECAST_BACKFILL")]
    pub forecast_backfill: Option<bool>,

    /// Minutes between observation runs
    #[arg(long, env = "KMA_OBS_EVERY_MINUTES")]
    pub obs_every_minutes: Option<u32>,

    /// Minutes past the cadence boundary for observation runs
    #[arg(long, env = "KMA_OBS_OFFSET_MINUTES")]
    pub obs_offset_minutes: Option<u32>,

    /// Minutes between forecast runs
    #[arg(long, env = "KMA_FCT_EVERY_MINUTES")]
    pub fct_every_minutes: Option<u32>,

    /// Minutes past the cadence boundary for forecast runs
    #[arg(long, env = "KMA_FCT_OFFSET_MINUTES")]
    pub fct_offset_minutes: Option<u32>,

    /// Upstream request timeout in seconds
    #[arg(long, env = "KMA_HTTP_TIMEOUT")]
    pub http_timeout: Option<u64>,

    /// User-Agent sent to the API hub
    #[arg(long, env = "KMA_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Directory holding the SQLite database
    #[arg(long, env = "KMA_DATA_DIR")]
    pub data_dir: Option<String>,

    /// DuckDB file for raw sensor measurements
    #[arg(long, env = "KMA_DUCKDB_PATH")]
    pub duckdb_path: Option<String>,

    /// Table name for raw sensor measurements
    #[arg(long, env = "KMA_MEASUREMENT_TABLE")]
    pub measurement_table: Option<String>,
}

impl KmaArgs {
    /// Fill every unset value from `file`.
    pub fn merge(self, file: KmaArgs) -> KmaArgs {
        KmaArgs {
            obs_url: self.obs_url.or(file.obs_url),
            fct_url: self.fct_url.or(file.fct_url),
            auth_key: self.auth_key.or(file.auth_key),
            station: self.station.or(file.station),
            init_days: self.init_days.or(file.init_days),
            forecast_backfill: self.forecast_backfill.or(file.forecast_backfill),
            obs_every_minutes: self.obs_every_minutes.or(file.obs_every_minutes),
            obs_offset_minutes: self.obs_offset_minutes.or(file.obs_offset_minutes),
            fct_every_minutes: self.fct_every_minutes.or(file.fct_every_minutes),
            fct_offset_minutes: self.fct_offset_minutes.or(file.fct_offset_minutes),
            http_timeout: self.http_timeout.or(file.http_timeout),
            user_agent: self.user_agent.or(file.user_agent),
            data_dir: self.data_dir.or(file.data_dir),
            duckdb_path: self.duckdb_path.or(file.duckdb_path),
            measurement_table: self.measurement_table.or(file.measurement_table),
        }
    }

    pub fn obs_url(&self) -> String {
        self.obs_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OBSERVATION_URL.to_string())
    }

    pub fn fct_url(&self) -> String {
        self.fct_url
            .clone()
            .unwrap_or_else(|| DEFAULT_FORECAST_URL.to_string())
    }

    pub fn auth_key(&self) -> String {
        self.auth_key.clone().unwrap_or_default()
    }

    pub fn station(&self) -> String {
        self.station
            .clone()
            .unwrap_or_else(|| DEFAULT_STATION.to_string())
    }

    pub fn init_days(&self) -> u32 {
        self.init_days.unwrap_or(DEFAULT_INIT_DAYS)
    }

    pub fn forecast_backfill(&self) -> bool {
        self.forecast_backfill.unwrap_or(true)
    }

    pub fn observation_cadence(&self) -> Cadence {
        Cadence::new(
            every_minutes(self.obs_every_minutes.unwrap_or(60)),
            offset_minutes(self.obs_offset_minutes.unwrap_or(10)),
        )
    }

    pub fn forecast_cadence(&self) -> Cadence {
        Cadence::new(
            every_minutes(self.fct_every_minutes.unwrap_or(360)),
            offset_minutes(self.fct_offset_minutes.unwrap_or(0)),
        )
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout.unwrap_or(30))
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("{}/{}", kma_core::APP_NAME, env!("CARGO_PKG_VERSION")))
    }

    pub fn data_dir(&self) -> String {
        self.data_dir
            .clone()
            .unwrap_or_else(|| "./data".to_string())
    }

    pub fn duckdb_path(&self) -> String {
        self.duckdb_path
            .clone()
            .unwrap_or_else(|| format!("{}/measurements.duckdb", self.data_dir()))
    }

    pub fn measurement_table(&self) -> String {
        self.measurement_table
            .clone()
            .unwrap_or_else(|| DEFAULT_MEASUREMENT_TABLE.to_string())
    }
}

fn every_minutes(value: u32) -> Duration {
    Duration::minutes(i64::from(value.max(1)))
}

fn offset_minutes(value: u32) -> Duration {
    Duration::minutes(i64::from(value))
}

impl fmt::Debug for KmaArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmaArgs")
            .field("obs_url", &self.obs_url)
            .field("fct_url", &self.fct_url)
            .field("auth_key", &self.auth_key.as_deref().map(mask_secret))
            .field("station", &self.station)
            .field("init_days", &self.init_days)
            .field("forecast_backfill", &self.forecast_backfill)
            .field("obs_every_minutes", &self.obs_every_minutes)
            .field("obs_offset_minutes", &self.obs_offset_minutes)
            .field("fct_every_minutes", &self.fct_every_minutes)
            .field("fct_offset_minutes", &self.fct_offset_minutes)
            .field("http_timeout", &self.http_timeout)
            .field("user_agent", &self.user_agent)
            .field("data_dir", &self.data_dir)
            .field("duckdb_path", &self.duckdb_path)
            .field("measurement_table", &self.measurement_table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_hub_schedule() {
        let args = KmaArgs::default();

        assert_eq!(args.station(), "108");
        assert_eq!(args.init_days(), 31);
        assert_eq!(
            args.observation_cadence(),
            Cadence::new(Duration::HOUR, Duration::minutes(10))
        );
        assert_eq!(
            args.forecast_cadence(),
            Cadence::new(Duration::hours(6), Duration::ZERO)
        );
        assert_eq!(args.duckdb_path(), "./data/measurements.duckdb");
        assert_eq!(args.measurement_table(), "sensor_data");
    }

    #[test]
    fn zero_offset_fires_on_the_boundary() {
        let args = KmaArgs {
            fct_every_minutes: Some(0),
            fct_offset_minutes: Some(0),
            obs_offset_minutes: Some(0),
            ..Default::default()
        };

        assert_eq!(args.observation_cadence().offset, Duration::ZERO);
        assert_eq!(
            args.forecast_cadence(),
            Cadence::new(Duration::minutes(1), Duration::ZERO)
        );
    }

    #[test]
    fn explicit_values_win_over_file_values() {
        let cli = KmaArgs {
            station: Some(String::from("159")),
            ..Default::default()
        };
        let file: KmaArgs = toml::from_str(
            r#"
            station = "108"
            auth_key = "from-file-key"
            init_days = 7
            "#,
        )
        .unwrap();

        let merged = cli.merge(file);
        assert_eq!(merged.station(), "159");
        assert_eq!(merged.auth_key(), "from-file-key");
        assert_eq!(merged.init_days(), 7);
    }

    #[test]
    fn debug_output_masks_the_auth_key() {
        let args = KmaArgs {
            auth_key: Some(String::from("abcdefgh1234")),
            ..Default::default()
        };
        let rendered = format!("{:?}", args);
        assert!(rendered.contains("********1234"));
        assert!(!rendered.contains("abcdefgh"));
    }
}
