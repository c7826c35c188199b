//! Raw alerts emitted by native sessions and the payload shapes they carry.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use swarmd_events::{
    AnnounceDetail, DiscoveredFile, PeerInfo, TorrentStateCode, TrackerStatus, TransferStats,
};
use tokio::sync::mpsc;

/// Channel end native sessions push alerts into.
pub type AlertSink = mpsc::UnboundedSender<NativeAlert>;

/// Channel end the aggregator drains.
pub type AlertReceiver = mpsc::UnboundedReceiver<NativeAlert>;

/// Alert kinds understood by the aggregator. Anything else is dropped.
pub mod kinds {
    /// Lifecycle state transition.
    pub const STATE_CHANGED: &str = "state_changed";
    /// Periodic status report with transfer counters.
    pub const STATE_UPDATE: &str = "state_update";
    /// Metadata became available.
    pub const METADATA_RECEIVED: &str = "metadata_received";
    /// A piece passed its hash check.
    pub const PIECE_FINISHED: &str = "piece_finished";
    /// A tracker announce succeeded.
    pub const TRACKER_REPLY: &str = "tracker_reply";
    /// A tracker announce failed.
    pub const TRACKER_ERROR: &str = "tracker_error";
    /// A peer connected.
    pub const PEER_CONNECT: &str = "peer_connect";
    /// A peer disconnected.
    pub const PEER_DISCONNECTED: &str = "peer_disconnected";
    /// Payload storage failed.
    pub const FILE_ERROR: &str = "file_error";
    /// Torrent-level failure.
    pub const TORRENT_ERROR: &str = "torrent_error";
    /// Every wanted piece is downloaded.
    pub const TORRENT_FINISHED: &str = "torrent_finished";
    /// The torrent left the native session.
    pub const TORRENT_REMOVED: &str = "torrent_removed";
    /// Session-level failure (listen socket, disk, etc).
    pub const SESSION_ERROR: &str = "session_error";
    /// Session-level failure cleared.
    pub const SESSION_RECOVERED: &str = "session_recovered";
    /// Session statistics; informational only.
    pub const SESSION_STATS: &str = "session_stats";
}

/// Opaque alert as produced by the native session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NativeAlert {
    /// Alert kind, see [`kinds`].
    pub kind: String,
    /// Hex info hash of the torrent the alert refers to, if any.
    pub info_hash: Option<String>,
    /// When the native session raised the alert.
    pub timestamp: DateTime<Utc>,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
}

impl NativeAlert {
    /// Build an alert for a torrent with a serialisable payload.
    #[must_use]
    pub fn torrent(kind: &str, info_hash: &str, payload: &impl Serialize) -> Self {
        Self {
            kind: kind.to_string(),
            info_hash: Some(info_hash.to_string()),
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Build a session-level alert.
    #[must_use]
    pub fn session(kind: &str, payload: &impl Serialize) -> Self {
        Self {
            kind: kind.to_string(),
            info_hash: None,
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Decode the payload into a typed shape.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Payload of `state_changed` and `state_update` alerts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatePayload {
    /// Native lifecycle state.
    pub state: TorrentStateCode,
    /// Transfer counters at the time of the alert.
    #[serde(default)]
    pub stats: Option<TransferStats>,
}

/// Payload of `metadata_received` alerts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataPayload {
    /// Name from the info dictionary.
    pub name: String,
    /// Nominal piece length in bytes.
    pub piece_length: u64,
    /// Number of pieces.
    pub piece_count: u32,
    /// Total payload size.
    pub total_bytes: u64,
    /// Files in payload order.
    pub files: Vec<DiscoveredFile>,
}

/// Payload of `piece_finished` alerts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PiecePayload {
    /// Verified piece index.
    pub piece_index: u32,
}

/// Payload of `tracker_reply` and `tracker_error` alerts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerPayload {
    /// Announce URL.
    pub url: String,
    /// Resulting tracker status.
    pub status: TrackerStatus,
    /// Reply details.
    #[serde(default)]
    pub detail: AnnounceDetail,
}

/// Payload of `peer_connect` alerts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerPayload {
    /// Connected peer.
    pub peer: PeerInfo,
}

/// Payload of `peer_disconnected` alerts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerGonePayload {
    /// Endpoint of the peer.
    pub endpoint: SocketAddr,
    /// Disconnect reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of error alerts (`file_error`, `torrent_error`, `session_error`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Human-readable failure description.
    pub message: String,
}

/// Payload of `torrent_removed` alerts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovedPayload {
    /// Whether payload data was deleted.
    #[serde(default)]
    pub with_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_through_alert() {
        let alert = NativeAlert::torrent(
            kinds::PIECE_FINISHED,
            "00",
            &PiecePayload { piece_index: 7 },
        );
        assert_eq!(alert.kind, "piece_finished");
        assert_eq!(alert.decode::<PiecePayload>().expect("decode").piece_index, 7);
        assert!(alert.decode::<ErrorPayload>().is_err());
    }

    #[test]
    fn session_alert_has_no_info_hash() {
        let alert = NativeAlert::session(
            kinds::SESSION_ERROR,
            &ErrorPayload {
                message: "listen failed".into(),
            },
        );
        assert!(alert.info_hash.is_none());
        assert_eq!(
            alert.decode::<ErrorPayload>().expect("decode").message,
            "listen failed"
        );
    }
}
