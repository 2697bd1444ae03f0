//! Config file discovery and loading.

use crate::schema::ParlorConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name looked up inside the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the Parlor config directory.
/// Priority: `PARLOR_CONFIG_DIR` env > platform config dir > `./.parlor`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLOR_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(base) = dirs::config_dir() {
        return base.join("parlor");
    }
    PathBuf::from(".parlor")
}

/// `config.yaml` inside `config_dir`.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Read a YAML config file. A missing file is not an error: the empty
/// config is returned and defaults fill it in later.
pub async fn load_config(path: &Path) -> Result<ParlorConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(ParlorConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Parse config YAML. An empty document is the default config.
pub fn parse_config(raw: &str) -> Result<ParlorConfig> {
    if raw.trim().is_empty() {
        return Ok(ParlorConfig::default());
    }
    Ok(serde_yaml::from_str(raw)?)
}
