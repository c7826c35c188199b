//! Configuration loading: optional JSON file, then environment overrides.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::EngineConfig;
use crate::validate::validate;

/// Path of an optional JSON configuration document.
pub const ENV_CONFIG_PATH: &str = "SWARMD_CONFIG";
/// Overrides [`EngineConfig::download_root`].
pub const ENV_DOWNLOAD_ROOT: &str = "SWARMD_DOWNLOAD_ROOT";
/// Overrides [`EngineConfig::metadata_dir`].
pub const ENV_METADATA_DIR: &str = "SWARMD_METADATA_DIR";
/// Overrides [`EngineConfig::add_timeout_ms`].
pub const ENV_ADD_TIMEOUT_MS: &str = "SWARMD_ADD_TIMEOUT_MS";
/// Overrides the logging level.
pub const ENV_LOG_LEVEL: &str = "SWARMD_LOG_LEVEL";
/// Overrides the logging format.
pub const ENV_LOG_FORMAT: &str = "SWARMD_LOG_FORMAT";

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read or parsed, or when
/// the merged settings fail validation.
pub fn load() -> ConfigResult<EngineConfig> {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration using `lookup` in place of the process environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with<F>(lookup: F) -> ConfigResult<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    let mut config = match var(ENV_CONFIG_PATH) {
        Some(path) => read_file(Path::new(&path))?,
        None => {
            debug!("no configuration file set; starting from defaults");
            EngineConfig::default()
        }
    };

    if let Some(root) = var(ENV_DOWNLOAD_ROOT) {
        config.download_root = PathBuf::from(root);
    }
    if let Some(dir) = var(ENV_METADATA_DIR) {
        config.metadata_dir = PathBuf::from(dir);
    }
    if let Some(raw) = var(ENV_ADD_TIMEOUT_MS) {
        config.add_timeout_ms = raw.trim().parse().map_err(|_| {
            ConfigError::invalid("engine", "add_timeout_ms", "must be an integer", Some(raw))
        })?;
    }
    if let Some(level) = var(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
    if let Some(format) = var(ENV_LOG_FORMAT) {
        config.logging.format = Some(format.trim().to_ascii_lowercase());
    }

    validate(&config)?;
    info!(
        download_root = %config.download_root.display(),
        metadata_dir = %config.metadata_dir.display(),
        add_timeout_ms = config.add_timeout_ms,
        "configuration loaded"
    );
    Ok(config)
}

fn read_file(path: &Path) -> ConfigResult<EngineConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
