//! Field validation for merged configuration.

use crate::error::{ConfigError, ConfigResult};
use crate::model::EngineConfig;

/// Upper bound for the synchronous add timeout (ten minutes).
pub const MAX_ADD_TIMEOUT_MS: u64 = 600_000;

/// Check a merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate(config: &EngineConfig) -> ConfigResult<()> {
    if config.download_root.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "engine",
            "download_root",
            "must not be empty",
            None,
        ));
    }
    if config.metadata_dir.as_os_str().is_empty() {
        return Err(ConfigError::invalid(
            "engine",
            "metadata_dir",
            "must not be empty",
            None,
        ));
    }
    if !(1..=MAX_ADD_TIMEOUT_MS).contains(&config.add_timeout_ms) {
        return Err(ConfigError::invalid(
            "engine",
            "add_timeout_ms",
            "must be between 1 and 600000",
            Some(config.add_timeout_ms.to_string()),
        ));
    }
    if config.event_bus_capacity == 0 {
        return Err(ConfigError::invalid(
            "engine",
            "event_bus_capacity",
            "must be positive",
            Some("0".to_string()),
        ));
    }

    let simulation = &config.simulation;
    if simulation.tick_interval_ms == 0 {
        return Err(ConfigError::invalid(
            "simulation",
            "tick_interval_ms",
            "must be positive",
            Some("0".to_string()),
        ));
    }
    if simulation.pieces_per_tick == 0 {
        return Err(ConfigError::invalid(
            "simulation",
            "pieces_per_tick",
            "must be positive",
            Some("0".to_string()),
        ));
    }
    if simulation.stats_every_ticks == 0 {
        return Err(ConfigError::invalid(
            "simulation",
            "stats_every_ticks",
            "must be positive",
            Some("0".to_string()),
        ));
    }

    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::invalid(
            "logging",
            "level",
            "must not be empty",
            None,
        ));
    }
    if let Some(format) = config.logging.format.as_deref()
        && !matches!(format, "json" | "pretty")
    {
        return Err(ConfigError::invalid(
            "logging",
            "format",
            "must be json or pretty",
            Some(format.to_string()),
        ));
    }
    Ok(())
}
