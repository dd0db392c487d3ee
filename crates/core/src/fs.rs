//! Filesystem utilities

use std::fs;
use std::path::Path;

use log::{error, info};

/// Create a directory and all parent directories if they don't exist
pub fn create_dir_all(path: &str) -> std::io::Result<()> {
    let path = Path::new(path);
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}

/// Ensure the parent directory of a file path exists
///
/// Returns false (after logging) when the directory could not be created.
pub fn ensure_dir_exists(file_path: &str) -> bool {
    let Some(parent) = Path::new(file_path).parent() else {
        return true;
    };
    if parent.as_os_str().is_empty() || parent.is_dir() {
        return true;
    }

    match fs::create_dir_all(parent) {
        Ok(_) => {
            info!("Created directory: {}", parent.display());
            true
        }
        Err(e) => {
            error!("Failed to create directory {}: {}", parent.display(), e);
            false
        }
    }
}
