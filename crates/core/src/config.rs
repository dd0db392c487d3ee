//! Configuration loading utilities
//!
//! Supports loading configuration from multiple sources in priority order:
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Config file (searched in standard locations)
//! 4. Built-in defaults (lowest priority)

use std::env;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::APP_NAME;

/// Describes where a configuration was loaded from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Explicit path provided via CLI or env var
    Explicit(PathBuf),
    /// Found in current working directory
    CurrentDir(PathBuf),
    /// Found in XDG config home (~/.config/kma-weather/)
    XdgConfig(PathBuf),
    /// Found in system config (/etc/kma-weather/)
    System(PathBuf),
    /// No config file found, using defaults
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConfigSource::Explicit(p)
            | ConfigSource::CurrentDir(p)
            | ConfigSource::XdgConfig(p)
            | ConfigSource::System(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path() {
            Some(p) => write!(f, "{}", p.display()),
            None => write!(f, "(defaults)"),
        }
    }
}

/// Find a configuration file in standard locations
///
/// Search order:
/// 1. Environment variable (e.g., KMA_GATEWAY_CONFIG)
/// 2. Current directory (e.g., gateway.toml)
/// 3. XDG config home ($XDG_CONFIG_HOME/kma-weather/ or ~/.config/kma-weather/)
/// 4. System config (/etc/kma-weather/)
pub fn find_config_file(env_var: &str, filename: &str) -> ConfigSource {
    let candidates = [
        env::var(env_var).ok().map(|p| ConfigSource::Explicit(PathBuf::from(p))),
        Some(ConfigSource::CurrentDir(PathBuf::from(filename))),
        xdg_config_path(filename).map(ConfigSource::XdgConfig),
        Some(ConfigSource::System(
            PathBuf::from("/etc").join(APP_NAME).join(filename),
        )),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|source| source.path().is_some_and(|p| p.is_file()))
        .unwrap_or(ConfigSource::Defaults)
}

fn xdg_config_path(filename: &str) -> Option<PathBuf> {
    let base = match env::var("XDG_CONFIG_HOME") {
        Ok(xdg_config) => PathBuf::from(xdg_config),
        Err(_) => PathBuf::from(env::var("HOME").ok()?).join(".config"),
    };
    Some(base.join(APP_NAME).join(filename))
}

/// Load and parse a TOML configuration file
///
/// Returns `T::default()` when the source is [`ConfigSource::Defaults`].
pub fn load_config<T: DeserializeOwned + Default>(source: &ConfigSource) -> anyhow::Result<T> {
    match source.path() {
        Some(path) => {
            let mut file = File::open(path)
                .with_context(|| format!("failed to open config file {}", path.display()))?;
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            let config: T = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            Ok(config)
        }
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Default, Debug, PartialEq)]
    struct Sample {
        station: Option<String>,
        lookback_days: Option<u32>,
    }

    #[test]
    fn test_config_source_display() {
        let source = ConfigSource::CurrentDir(PathBuf::from("test.toml"));
        assert_eq!(format!("{}", source), "test.toml");

        let source = ConfigSource::Defaults;
        assert_eq!(format!("{}", source), "(defaults)");
    }

    #[test]
    fn test_defaults_source_loads_default_value() {
        let loaded: Sample = load_config(&ConfigSource::Defaults).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_missing_env_path_is_not_explicit() {
        let source = find_config_file(
            "KMA_CORE_TEST_CONFIG_THAT_IS_NEVER_SET",
            "kma-core-test-missing.toml",
        );
        assert!(!matches!(source, ConfigSource::Explicit(_)));
    }

    #[test]
    fn test_load_explicit_toml_file() {
        let path = std::env::temp_dir().join(format!("kma-core-{}.toml", std::process::id()));
        std::fs::write(&path, "station = \"108\"\nlookback_days = 7\n").unwrap();

        let loaded: Sample = load_config(&ConfigSource::Explicit(path.clone())).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.station.as_deref(), Some("108"));
        assert_eq!(loaded.lookback_days, Some(7));
    }
}
