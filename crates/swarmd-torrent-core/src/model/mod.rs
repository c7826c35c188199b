//! Core torrent domain types and DTOs shared across the workspace.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swarmd_events::{PeerFlags, TorrentId, TorrentStateCode, TrackerStatus};

/// Source describing how a torrent should be added to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TorrentSource {
    /// Represents a magnet URI that should be resolved through the swarm.
    Magnet {
        /// Magnet URI to resolve and add.
        uri: String,
    },
    /// Represents a `.torrent` file on the local filesystem.
    File {
        /// Path to the metainfo file.
        path: PathBuf,
    },
    /// Represents raw `.torrent` metainfo bytes.
    Metainfo {
        /// Bencoded metainfo payload.
        bytes: Vec<u8>,
    },
}

impl TorrentSource {
    #[must_use]
    /// Convenience constructor for magnet-based sources.
    pub fn magnet(uri: impl Into<String>) -> Self {
        Self::Magnet { uri: uri.into() }
    }

    #[must_use]
    /// Convenience constructor for file-based sources.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    #[must_use]
    /// Convenience constructor for metainfo-based sources.
    pub fn metainfo(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Metainfo {
            bytes: bytes.into(),
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Magnet { .. } => "magnet",
            Self::File { .. } => "file",
            Self::Metainfo { .. } => "metainfo",
        }
    }
}

/// Request payload for admitting a torrent into the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTorrent {
    /// How the torrent should be retrieved.
    pub source: TorrentSource,
    /// Directory the payload is written into.
    pub save_path: PathBuf,
    /// Identifier the caller expects the source to hash to.
    #[serde(default)]
    pub expected_id: Option<TorrentId>,
    #[serde(default)]
    /// Optional knobs applied alongside admission.
    pub options: AddTorrentOptions,
}

impl AddTorrent {
    /// Build a request with default options.
    #[must_use]
    pub fn new(source: TorrentSource, save_path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            save_path: save_path.into(),
            expected_id: None,
            options: AddTorrentOptions::default(),
        }
    }
}

/// Optional knobs that accompany a torrent admission request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AddTorrentOptions {
    /// Friendly name to display before metadata is fetched.
    pub name_hint: Option<String>,
    /// Initial per-file priorities; empty means every file at normal priority.
    #[serde(default)]
    pub file_priorities: Vec<FilePriority>,
    /// Whether the torrent should start paused.
    #[serde(default)]
    pub start_paused: bool,
}

/// Completion semantics for an add request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddMode {
    /// Return once the torrent is registered and handed to the session.
    #[default]
    Async,
    /// Wait until the torrent reports a usable status with metadata.
    Sync,
}

/// Priority level recognized by the native session.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    /// Do not download the file.
    Skip,
    /// Throttle the download priority.
    Low,
    /// Default priority level assigned by the engine.
    #[default]
    Normal,
    /// Highest available priority for urgent files.
    High,
}

impl FilePriority {
    /// Numeric level on the native 0-7 scale.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Skip => 0,
            Self::Low => 1,
            Self::Normal => 4,
            Self::High => 7,
        }
    }

    /// Whether pieces of this file should be downloaded at all.
    #[must_use]
    pub const fn is_wanted(self) -> bool {
        !matches!(self, Self::Skip)
    }
}

/// Durable record of a torrent managed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Torrent {
    /// Hash-derived identifier.
    pub id: TorrentId,
    /// Display name (metadata name once known).
    pub name: String,
    /// Source the torrent was added from.
    pub source: TorrentSource,
    /// Directory holding the payload.
    pub save_path: PathBuf,
    /// Per-file priorities.
    #[serde(default)]
    pub file_priorities: Vec<FilePriority>,
    /// Timestamp when the torrent was added.
    pub added_at: DateTime<Utc>,
}

/// Fixed-length record of verified pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceBitmap(Vec<bool>);

impl PieceBitmap {
    /// Bitmap with `len` unverified pieces.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self(vec![false; len])
    }

    /// Wrap an existing bit vector.
    #[must_use]
    pub const fn from_bits(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    /// Number of pieces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether metadata has not yet fixed the length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the piece at `index` is verified.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    /// Mark a piece verified. Returns `true` if the bit changed.
    ///
    /// Out-of-range indices are ignored; the length never changes.
    pub fn set(&mut self, index: usize) -> bool {
        match self.0.get_mut(index) {
            Some(bit) if !*bit => {
                *bit = true;
                true
            }
            _ => false,
        }
    }

    /// Number of verified pieces.
    #[must_use]
    pub fn count_done(&self) -> usize {
        self.0.iter().filter(|bit| **bit).count()
    }

    /// Whether every piece is verified. An empty bitmap is never complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|bit| *bit)
    }

    /// Borrow the raw bits.
    #[must_use]
    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Consume the bitmap into its bits.
    #[must_use]
    pub fn into_vec(self) -> Vec<bool> {
        self.0
    }
}

/// Compact status snapshot for a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicState {
    /// Identifier for the torrent.
    pub id: TorrentId,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub state: TorrentStateCode,
    /// Completion percentage (0-100).
    pub progress: u8,
    /// Current download rate in bytes per second.
    pub download_bps: u64,
    /// Current upload rate in bytes per second.
    pub upload_bps: u64,
    /// Estimated seconds to completion, when downloading.
    pub eta_seconds: Option<u64>,
    /// Number of connected peers.
    pub connected_peers: u32,
    /// Total wanted payload size in bytes.
    pub total_bytes: u64,
    /// Verified payload bytes.
    pub done_bytes: u64,
    /// Last error reported by the native session.
    pub error: Option<String>,
}

impl BasicState {
    /// Snapshot for a freshly registered torrent.
    #[must_use]
    pub fn pending(id: TorrentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: TorrentStateCode::Added,
            progress: 0,
            download_bps: 0,
            upload_bps: 0,
            eta_seconds: None,
            connected_peers: 0,
            total_bytes: 0,
            done_bytes: 0,
            error: None,
        }
    }
}

/// Detailed status snapshot; a superset of [`BasicState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedState {
    /// Basic fields.
    pub basic: BasicState,
    /// Directory holding the payload.
    pub save_path: PathBuf,
    /// Timestamp when the torrent was added.
    pub added_at: DateTime<Utc>,
    /// Connected seeds.
    pub seeds: u32,
    /// Connected leechers.
    pub leechers: u32,
    /// Payload bytes downloaded this session.
    pub total_downloaded: u64,
    /// Payload bytes uploaded this session.
    pub total_uploaded: u64,
    /// Uploaded divided by downloaded; zero before any download.
    pub share_ratio: f64,
    /// Distributed copies visible across connected peers.
    pub availability: f64,
    /// Number of trackers.
    pub tracker_count: u32,
    /// Number of trackers whose last announce succeeded.
    pub working_trackers: u32,
    /// Number of connected peers.
    pub peer_count: u32,
    /// Seconds the torrent has been active.
    pub active_seconds: u64,
    /// Number of pieces, zero until metadata is known.
    pub pieces_total: u32,
    /// Number of verified pieces.
    pub pieces_done: u32,
}

/// State of one tracker in announce-list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerState {
    /// Announce URL.
    pub url: String,
    /// Announce tier.
    pub tier: u32,
    /// Announce status.
    pub status: TrackerStatus,
    /// Last tracker message or error.
    pub message: Option<String>,
    /// Next scheduled announce.
    pub next_announce: Option<DateTime<Utc>>,
    /// Seeds reported by the tracker.
    pub seeds: Option<u32>,
    /// Leechers reported by the tracker.
    pub leechers: Option<u32>,
    /// Peers returned by the last announce.
    pub peers: u32,
}

impl TrackerState {
    /// Tracker that has not been contacted yet.
    #[must_use]
    pub fn new(url: impl Into<String>, tier: u32) -> Self {
        Self {
            url: url.into(),
            tier,
            status: TrackerStatus::NotContacted,
            message: None,
            next_announce: None,
            seeds: None,
            leechers: None,
            peers: 0,
        }
    }
}

/// State of one connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerState {
    /// Remote endpoint.
    pub endpoint: SocketAddr,
    /// Client identification string.
    pub client: String,
    /// Peer progress percentage (0-100).
    pub progress: u8,
    /// Download rate from the peer in bytes per second.
    pub download_bps: u64,
    /// Upload rate to the peer in bytes per second.
    pub upload_bps: u64,
    /// Connection flags.
    pub flags: PeerFlags,
}

/// Session-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Torrents known to the engine.
    pub torrents: u32,
    /// Torrents currently checking or downloading.
    pub downloading: u32,
    /// Torrents finished or seeding.
    pub completed: u32,
    /// Aggregate download rate.
    pub download_bps: u64,
    /// Aggregate upload rate.
    pub upload_bps: u64,
    /// Aggregate payload bytes downloaded.
    pub total_downloaded: u64,
    /// Aggregate payload bytes uploaded.
    pub total_uploaded: u64,
}

/// Data deletion failure reported by a delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDeletionFailure {
    /// Torrent whose payload could not be fully deleted.
    pub torrent_id: TorrentId,
    /// Failure description.
    pub message: String,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Torrents removed by this call.
    pub removed: Vec<TorrentId>,
    /// Requested ids that were not present.
    pub skipped: Vec<TorrentId>,
    /// Payload deletions that failed; the torrents were still removed.
    pub data_failures: Vec<DataDeletionFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torrent_source_helpers_construct_variants() {
        let magnet = TorrentSource::magnet("magnet:?xt=urn:btih:demo");
        assert_eq!(magnet.kind(), "magnet");
        match magnet {
            TorrentSource::Magnet { uri } => assert!(uri.contains("demo")),
            other => panic!("expected magnet variant, got {other:?}"),
        }

        let data = vec![1_u8, 2, 3];
        match TorrentSource::metainfo(data.clone()) {
            TorrentSource::Metainfo { bytes } => assert_eq!(bytes, data),
            other => panic!("expected metainfo variant, got {other:?}"),
        }
        assert_eq!(TorrentSource::file("/tmp/a.torrent").kind(), "file");
    }

    #[test]
    fn bitmap_length_is_fixed() {
        let mut bitmap = PieceBitmap::new(3);
        assert!(!bitmap.is_complete());
        assert!(bitmap.set(0));
        assert!(!bitmap.set(0));
        assert!(!bitmap.set(10));
        assert_eq!(bitmap.len(), 3);
        assert_eq!(bitmap.count_done(), 1);
        assert!(bitmap.set(1));
        assert!(bitmap.set(2));
        assert!(bitmap.is_complete());
        assert!(!PieceBitmap::default().is_complete());
    }

    #[test]
    fn file_priority_levels_match_native_scale() {
        assert_eq!(FilePriority::Skip.level(), 0);
        assert_eq!(FilePriority::Low.level(), 1);
        assert_eq!(FilePriority::default().level(), 4);
        assert_eq!(FilePriority::High.level(), 7);
        assert!(!FilePriority::Skip.is_wanted());
    }

    #[test]
    fn torrent_record_serialises_source_tag() {
        let torrent = Torrent {
            id: TorrentId::from_info_hash(&[2; 20]),
            name: "demo".into(),
            source: TorrentSource::magnet("magnet:?xt=urn:btih:x"),
            save_path: PathBuf::from("/data"),
            file_priorities: vec![FilePriority::High],
            added_at: Utc::now(),
        };
        let json = serde_json::to_value(&torrent).expect("serialize");
        assert_eq!(json["source"]["type"], "magnet");
        let back: Torrent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, torrent);
    }
}
