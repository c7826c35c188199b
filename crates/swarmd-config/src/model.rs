//! Typed configuration models.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Settings consumed by the engine and the application shell.
///
/// Every field has a default so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Root directory new torrents download into unless the request names one.
    pub download_root: PathBuf,
    /// Directory holding one JSON metadata document per torrent.
    pub metadata_dir: PathBuf,
    /// Limit for synchronous adds, in milliseconds.
    pub add_timeout_ms: u64,
    /// Window within which status-only updates for one torrent are coalesced.
    pub status_coalesce_ms: u64,
    /// Capacity of the internal event bus.
    pub event_bus_capacity: usize,
    /// Native session simulation settings.
    pub simulation: SimulationSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from(defaults::DOWNLOAD_ROOT),
            metadata_dir: PathBuf::from(defaults::METADATA_DIR),
            add_timeout_ms: defaults::ADD_TIMEOUT_MS,
            status_coalesce_ms: defaults::STATUS_COALESCE_MS,
            event_bus_capacity: defaults::EVENT_BUS_CAPACITY,
            simulation: SimulationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Synchronous add timeout.
    #[must_use]
    pub const fn add_timeout(&self) -> Duration {
        Duration::from_millis(self.add_timeout_ms)
    }

    /// Status coalescing window.
    #[must_use]
    pub const fn status_coalesce(&self) -> Duration {
        Duration::from_millis(self.status_coalesce_ms)
    }
}

/// Knobs for the simulated native session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSettings {
    /// Worker tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Pieces verified per torrent per tick.
    pub pieces_per_tick: u32,
    /// Simulated peers per torrent.
    pub peers_per_torrent: u32,
    /// Keep seeding once every piece is verified.
    pub seed_after_finish: bool,
    /// Emit a session stats alert every N ticks.
    pub stats_every_ticks: u32,
    /// Seed for the simulation RNG.
    pub rng_seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: defaults::SIM_TICK_INTERVAL_MS,
            pieces_per_tick: defaults::SIM_PIECES_PER_TICK,
            peers_per_torrent: defaults::SIM_PEERS_PER_TORRENT,
            seed_after_finish: true,
            stats_every_ticks: defaults::SIM_STATS_EVERY_TICKS,
            rng_seed: defaults::SIM_RNG_SEED,
        }
    }
}

impl SimulationSettings {
    /// Tick interval as a duration.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directive; `RUST_LOG` still takes precedence at install time.
    pub level: String,
    /// `json` or `pretty`; inferred from the build profile when absent.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            format: None,
        }
    }
}
