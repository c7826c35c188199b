//! Strongly typed inputs and policies exposed by the native adapter.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use swarmd_events::TorrentId;
use swarmd_torrent_core::FilePriority;

use crate::metainfo::SourceInfo;

/// Opaque handle for a torrent inside a native session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "h{}", self.0)
    }
}

/// Parameters for admitting a torrent into a native session.
#[derive(Debug, Clone)]
pub struct AddParams {
    /// Identifier derived from the source.
    pub id: TorrentId,
    /// Identity, trackers and (optionally) layout of the source.
    pub info: SourceInfo,
    /// Directory the payload is written into.
    pub save_path: PathBuf,
    /// Initial per-file priorities; empty means all normal.
    pub priorities: Vec<FilePriority>,
    /// Whether to add the torrent paused.
    pub paused: bool,
}

/// Result of removing a torrent from a native session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalOutcome {
    /// Set when payload deletion was requested and failed (fully or partially).
    pub data_error: Option<String>,
}

/// Behaviour knobs for the simulated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Interval between protocol ticks.
    pub tick_interval: Duration,
    /// Pieces verified per downloading torrent per tick.
    pub pieces_per_tick: u32,
    /// Peers connected per torrent once a tracker responds.
    pub peers_per_torrent: u32,
    /// Keep seeding after completion instead of stopping at `finished`.
    pub seed_after_finish: bool,
    /// Emit a session statistics alert every this many ticks (0 disables).
    pub stats_every_ticks: u32,
    /// Seed for the peer generator.
    pub rng_seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            pieces_per_tick: 4,
            peers_per_torrent: 3,
            seed_after_finish: true,
            stats_every_ticks: 20,
            rng_seed: 0x5eed,
        }
    }
}

impl SimulationConfig {
    /// Fast settings for tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            tick_interval: Duration::from_millis(5),
            pieces_per_tick: 2,
            ..Self::default()
        }
    }
}
