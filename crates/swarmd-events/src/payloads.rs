//! Event payload types carried across the engine.

use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InvalidTorrentId;

/// Identifier assigned to each event published on the bus.
pub type EventId = u64;

/// Default buffer size for the broadcast channel.
pub const DEFAULT_BUS_CAPACITY: usize = 1_024;

/// Stable identifier for a torrent, derived from its info hash.
///
/// Stored as lowercase hex: 40 characters for v1 (SHA-1) hashes, 64 for v2.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TorrentId(String);

impl TorrentId {
    /// Parse and normalise a hex info hash.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTorrentId`] when the value is not 40 or 64 hex characters.
    pub fn parse(value: &str) -> Result<Self, InvalidTorrentId> {
        let trimmed = value.trim();
        if trimmed.len() != 40 && trimmed.len() != 64 {
            return Err(InvalidTorrentId::Length { len: trimmed.len() });
        }
        let normalised = trimmed.to_ascii_lowercase();
        hex::decode(&normalised).map_err(|_| InvalidTorrentId::NotHex)?;
        Ok(Self(normalised))
    }

    /// Build an identifier from raw info hash bytes.
    #[must_use]
    pub fn from_info_hash(hash: &[u8]) -> Self {
        Self(hex::encode(hash))
    }

    /// Borrow the identifier as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TorrentId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for TorrentId {
    type Err = InvalidTorrentId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TorrentId {
    type Error = InvalidTorrentId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TorrentId> for String {
    fn from(id: TorrentId) -> Self {
        id.0
    }
}

/// Lifecycle state codes for a managed torrent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStateCode {
    /// Registered with the engine; the native session has not reported yet.
    #[default]
    Added,
    /// Resolving metadata for a magnet source.
    DownloadingMetadata,
    /// Verifying on-disk data against piece hashes.
    Checking,
    /// Actively downloading payload data.
    Downloading,
    /// Every piece is verified; protocol activity has stopped.
    Finished,
    /// Every piece is verified and the torrent is uploading to peers.
    Seeding,
    /// Paused by the user.
    Paused,
    /// The native layer reported a failure.
    Error,
}

impl TorrentStateCode {
    /// Whether this state is terminal for download purposes.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Finished | Self::Seeding)
    }

    /// Whether progress is expected to grow monotonically in this state.
    #[must_use]
    pub const fn is_progressing(self) -> bool {
        matches!(self, Self::Checking | Self::Downloading)
    }

    /// Machine-friendly name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::DownloadingMetadata => "downloading_metadata",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Finished => "finished",
            Self::Seeding => "seeding",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}

/// Transfer counters reported with a native status update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferStats {
    /// Verified payload bytes on disk.
    pub bytes_done: u64,
    /// Total payload size in bytes.
    pub bytes_total: u64,
    /// Current download rate in bytes per second.
    pub download_bps: u64,
    /// Current upload rate in bytes per second.
    pub upload_bps: u64,
    /// Payload bytes downloaded during this session.
    pub total_downloaded: u64,
    /// Payload bytes uploaded during this session.
    pub total_uploaded: u64,
    /// Seconds the torrent has been active.
    pub active_seconds: u64,
}

/// Tracker announce status as reported by the native session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// No announce has been attempted yet.
    #[default]
    NotContacted,
    /// An announce is in flight.
    Updating,
    /// The last announce succeeded.
    Working,
    /// The last announce failed.
    NotWorking,
}

/// Details attached to a tracker announce reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnounceDetail {
    /// Tracker message or error text.
    pub message: Option<String>,
    /// Seeds reported by the tracker scrape.
    pub seeds: Option<u32>,
    /// Leechers reported by the tracker scrape.
    pub leechers: Option<u32>,
    /// Number of peers returned by the announce.
    pub peers_returned: u32,
    /// When the next announce is scheduled.
    pub next_announce: Option<DateTime<Utc>>,
}

/// Connection flags for a connected peer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerFlags {
    /// The peer has every piece.
    pub seed: bool,
    /// The connection was initiated by the remote side.
    pub incoming: bool,
    /// The connection is encrypted.
    pub encrypted: bool,
    /// The connection runs over uTP.
    pub utp: bool,
    /// We are choked by the peer.
    pub choked: bool,
    /// We are interested in pieces the peer has.
    pub interested: bool,
}

/// Peer details carried by a connect event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    /// Remote endpoint of the peer.
    pub endpoint: SocketAddr,
    /// Client identification string.
    pub client: String,
    /// Peer progress in permille (0-1000).
    pub progress_permille: u16,
    /// Download rate from this peer in bytes per second.
    pub download_bps: u64,
    /// Upload rate to this peer in bytes per second.
    pub upload_bps: u64,
    /// Connection flags.
    pub flags: PeerFlags,
}

/// File entry discovered once metadata is available.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Relative path inside the torrent payload.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Typed events produced by the aggregator and the engine facade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A torrent was registered with the engine.
    TorrentAdded {
        /// Identifier for the torrent that was added.
        torrent_id: TorrentId,
        /// Display name known at admission time.
        name: String,
    },
    /// Metadata became available (immediately for metainfo, later for magnets).
    MetadataReceived {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
        /// Name taken from the metadata.
        name: String,
        /// Nominal piece length in bytes.
        piece_length: u64,
        /// Number of pieces in the payload.
        piece_count: u32,
        /// Total payload size in bytes.
        total_bytes: u64,
        /// Files contained in the payload.
        files: Vec<DiscoveredFile>,
    },
    /// The torrent status changed (state code or transfer counters).
    StateChanged {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
        /// Current lifecycle state.
        state: TorrentStateCode,
        /// Transfer counters when the update came from a native status report.
        stats: Option<TransferStats>,
    },
    /// A piece passed hash verification.
    PieceFinished {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
        /// Zero-based piece index.
        piece_index: u32,
    },
    /// A tracker answered (or failed to answer) an announce.
    TrackerReply {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
        /// Announce URL of the tracker.
        tracker_url: String,
        /// Resulting tracker status.
        status: TrackerStatus,
        /// Reply details.
        detail: AnnounceDetail,
    },
    /// A peer connection was established.
    PeerConnected {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
        /// Connected peer.
        peer: PeerInfo,
    },
    /// A peer connection was closed.
    PeerDisconnected {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
        /// Endpoint of the disconnected peer.
        peer: SocketAddr,
    },
    /// The native layer reported a torrent failure.
    TorrentError {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
        /// Human-readable failure description.
        message: String,
    },
    /// Every piece is downloaded and verified.
    TorrentFinished {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
    },
    /// The torrent was removed from the engine.
    TorrentRemoved {
        /// Identifier for the torrent.
        torrent_id: TorrentId,
    },
    /// Session health changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TorrentAdded { .. } => "torrent_added",
            Self::MetadataReceived { .. } => "metadata_received",
            Self::StateChanged { .. } => "state_changed",
            Self::PieceFinished { .. } => "piece_finished",
            Self::TrackerReply { .. } => "tracker_reply",
            Self::PeerConnected { .. } => "peer_connected",
            Self::PeerDisconnected { .. } => "peer_disconnected",
            Self::TorrentError { .. } => "torrent_error",
            Self::TorrentFinished { .. } => "torrent_finished",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }

    /// Torrent the event refers to, if any.
    #[must_use]
    pub const fn torrent_id(&self) -> Option<&TorrentId> {
        match self {
            Self::TorrentAdded { torrent_id, .. }
            | Self::MetadataReceived { torrent_id, .. }
            | Self::StateChanged { torrent_id, .. }
            | Self::PieceFinished { torrent_id, .. }
            | Self::TrackerReply { torrent_id, .. }
            | Self::PeerConnected { torrent_id, .. }
            | Self::PeerDisconnected { torrent_id, .. }
            | Self::TorrentError { torrent_id, .. }
            | Self::TorrentFinished { torrent_id }
            | Self::TorrentRemoved { torrent_id } => Some(torrent_id),
            Self::HealthChanged { .. } => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "3FE5F1A11C51CD01FD09A79621E074DDA8EB36B6";

    fn id() -> TorrentId {
        TorrentId::parse(HASH).expect("valid hash")
    }

    #[test]
    fn torrent_id_normalises_case_and_rejects_garbage() {
        let parsed = id();
        assert_eq!(parsed.as_str(), HASH.to_ascii_lowercase());
        assert_eq!(parsed.to_string(), parsed.as_str());

        assert!(matches!(
            TorrentId::parse("abc"),
            Err(InvalidTorrentId::Length { len: 3 })
        ));
        assert!(matches!(
            TorrentId::parse(&"z".repeat(40)),
            Err(InvalidTorrentId::NotHex)
        ));
        assert!(TorrentId::parse(&"ab".repeat(32)).is_ok());
    }

    #[test]
    fn torrent_id_round_trips_through_serde_as_string() {
        let encoded = serde_json::to_string(&id()).expect("serialize");
        assert_eq!(encoded, format!("\"{}\"", HASH.to_ascii_lowercase()));
        assert!(serde_json::from_str::<TorrentId>("\"nope\"").is_err());
    }

    #[test]
    fn from_info_hash_encodes_hex() {
        let id = TorrentId::from_info_hash(&[0xab; 20]);
        assert_eq!(id.as_str(), "ab".repeat(20));
    }

    #[test]
    fn event_kind_and_id_cover_torrent_variants() {
        let torrent_id = id();
        let cases = vec![
            (
                Event::PieceFinished {
                    torrent_id: torrent_id.clone(),
                    piece_index: 3,
                },
                "piece_finished",
            ),
            (
                Event::TorrentFinished {
                    torrent_id: torrent_id.clone(),
                },
                "torrent_finished",
            ),
            (
                Event::PeerDisconnected {
                    torrent_id: torrent_id.clone(),
                    peer: "10.0.0.1:6881".parse().expect("addr"),
                },
                "peer_disconnected",
            ),
        ];
        for (event, kind) in cases {
            assert_eq!(event.kind(), kind);
            assert_eq!(event.torrent_id(), Some(&torrent_id));
        }

        let health = Event::HealthChanged {
            degraded: vec!["session".into()],
        };
        assert_eq!(health.kind(), "health_changed");
        assert!(health.torrent_id().is_none());
    }

    #[test]
    fn state_code_classification() {
        assert!(TorrentStateCode::Seeding.is_complete());
        assert!(TorrentStateCode::Finished.is_complete());
        assert!(!TorrentStateCode::Paused.is_complete());
        assert!(TorrentStateCode::Checking.is_progressing());
        assert!(!TorrentStateCode::Error.is_progressing());
        assert_eq!(TorrentStateCode::DownloadingMetadata.as_str(), "downloading_metadata");
    }
}
