//! KMA Weather Core Library
//!
//! Shared utilities for the ingestion library and the gateway service:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - Secret masking for log output

mod config;
pub mod fs;
mod mask;

pub use config::{find_config_file, load_config, ConfigSource};
pub use fs::{create_dir_all, ensure_dir_exists};
pub use mask::{mask_secret, mask_secret_keep};

/// Application name used for XDG paths
pub const APP_NAME: &str = "kma-weather";

/// Default gateway port
pub const DEFAULT_GATEWAY_PORT: u16 = 9810;
