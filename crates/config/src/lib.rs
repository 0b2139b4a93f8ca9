//! Shared configuration paths for the Google API wrapper
//!
//! Everything user-specific lives under two roots:
//! - `~/.config/googleapiwrapper/` for credentials and tokens
//! - `~/.cache/googleapiwrapper/` for the default Gmail cache output
//!
//! Tokens and credentials are kept per project so several tools can share a
//! machine without clobbering each other's OAuth state.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "googleapiwrapper";

/// Create the config directory if it doesn't exist and return it.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Config directory (`~/.config/googleapiwrapper/`)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR_NAME))
}

/// Default base directory for cached API data (`~/.cache/googleapiwrapper/`)
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join(APP_DIR_NAME))
}

/// Path to a file within the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Path to a file within a project's subdirectory of the config directory
pub fn project_config_path(project: &str, filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(project).join(filename))
}

/// Load and parse a JSON file from the config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a file exists in the config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Serialize `value` as pretty JSON to `path`, creating parent directories.
pub fn save_json_file<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
