//! Default values applied when a setting is absent.

pub(crate) const DOWNLOAD_ROOT: &str = "./downloads";
pub(crate) const METADATA_DIR: &str = "./state/torrents";
pub(crate) const ADD_TIMEOUT_MS: u64 = 30_000;
pub(crate) const STATUS_COALESCE_MS: u64 = 250;
pub(crate) const EVENT_BUS_CAPACITY: usize = 1_024;
pub(crate) const LOG_LEVEL: &str = "info";

pub(crate) const SIM_TICK_INTERVAL_MS: u64 = 250;
pub(crate) const SIM_PIECES_PER_TICK: u32 = 4;
pub(crate) const SIM_PEERS_PER_TORRENT: u32 = 3;
pub(crate) const SIM_STATS_EVERY_TICKS: u32 = 20;
pub(crate) const SIM_RNG_SEED: u64 = 0x5eed;
