//! Config file discovery and loading.

use crate::env::resolve_env_vars;
use crate::schema::CadenceConfig;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Config file name, both in the working directory and the OS config dir.
pub const CONFIG_FILE_NAME: &str = "cadence.yaml";

/// Env var naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CADENCE_CONFIG";

/// The per-user cadence config directory (`~/.config/cadence` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadence"))
}

/// Find the config file to load.
///
/// Order: the explicit path (flag or `CADENCE_CONFIG`), then `./cadence.yaml`,
/// then the OS config dir. `None` means run on defaults.
pub fn discover_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

/// Parse YAML config text, substituting `${VAR}` references.
pub fn parse_config(raw: &str) -> Result<CadenceConfig> {
    let value: serde_json::Value =
        serde_yaml::from_str(raw).context("Failed to parse config YAML")?;
    // An empty file parses as null.
    let value = if value.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        value
    };
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;
    serde_json::from_value(value).context("Config does not match the cadence schema")
}

/// Load the config at `path`.
pub async fn load_config(path: &Path) -> Result<CadenceConfig> {
    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config(&raw).with_context(|| format!("Invalid config at: {}", path.display()))?;
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Load the discovered config, or defaults when there is none.
pub async fn load_discovered(explicit: Option<&Path>) -> Result<CadenceConfig> {
    match discover_config(explicit) {
        Some(path) => load_config(&path).await,
        None => {
            debug!("No config file found; using defaults");
            Ok(CadenceConfig::default())
        }
    }
}
