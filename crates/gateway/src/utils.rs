use clap::Parser;
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use kma_core::{find_config_file, load_config, ConfigSource, DEFAULT_GATEWAY_PORT};
use kma_ingest::KmaArgs;
use log::LevelFilter;
use std::env;
use time::{format_description::well_known::Iso8601, OffsetDateTime};

use crate::ApiKeySeed;

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "KMA weather gateway - scheduled KMA ingestion behind an API-key gate"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $KMA_GATEWAY_CONFIG, ./gateway.toml,
    /// $XDG_CONFIG_HOME/kma-weather/gateway.toml, /etc/kma-weather/gateway.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "KMA_GATEWAY_LEVEL")]
    pub level: Option<String>,

    /// Host to listen on (use 0.0.0.0 for all interfaces)
    #[arg(short, long, env = "KMA_GATEWAY_HOST")]
    #[serde(alias = "host")]
    pub domain: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "KMA_GATEWAY_PORT")]
    pub port: Option<String>,

    /// Run the recurring ingestion jobs inside this process
    #[arg(short, long, env = "KMA_GATEWAY_SCHEDULER")]
    pub scheduler: Option<bool>,

    #[command(flatten)]
    #[serde(flatten)]
    pub kma: KmaArgs,

    /// Keys provisioned at startup, config file only (`[[api_keys]]`)
    #[arg(skip)]
    #[serde(default)]
    pub api_keys: Vec<ApiKeySeed>,
}

impl Cli {
    pub fn host(&self) -> String {
        self.domain
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn port(&self) -> String {
        self.port
            .clone()
            .unwrap_or_else(|| DEFAULT_GATEWAY_PORT.to_string())
    }

    pub fn scheduler_enabled(&self) -> bool {
        self.scheduler.unwrap_or(true)
    }

    /// Merge parsed arguments over a config file's values.
    pub fn merge(self, file_config: Cli) -> Cli {
        Cli {
            config: self.config,
            level: self.level.or(file_config.level),
            domain: self.domain.or(file_config.domain),
            port: self.port.or(file_config.port),
            scheduler: self.scheduler.or(file_config.scheduler),
            kma: self.kma.merge(file_config.kma),
            api_keys: file_config.api_keys,
        }
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("KMA_GATEWAY_CONFIG", "gateway.toml")
    };

    if let Some(path) = source.path() {
        log::info!("Loading config from: {}", path.display());
    }

    let file_config: Cli = match load_config(&source) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ignoring config file: {:#}", e);
            Cli::default()
        }
    };

    // env vars are handled by clap
    cli_args.merge(file_config)
}

pub fn get_log_level(cli: &Cli) -> LevelFilter {
    let level_str = cli
        .level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    match level_str.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub fn setup_logger() -> Dispatch {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}: {}",
                OffsetDateTime::now_utc()
                    .format(&Iso8601::DEFAULT)
                    .unwrap_or_default(),
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
}
