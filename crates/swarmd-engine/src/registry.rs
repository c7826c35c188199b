//! Authoritative in-memory state for every managed torrent.
//!
//! The aggregator is the only writer of runtime status (`apply`); the facade
//! inserts, removes and edits static fields (`insert`, `remove`, `upsert`).
//! Readers always receive owned copies.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use swarmd_events::{DiscoveredFile, Event, PeerInfo, TorrentId, TorrentStateCode, TransferStats};
use swarmd_torrent_core::{
    AdvancedState, BasicState, FilePriority, PeerState, PieceBitmap, SessionState, Torrent,
    TrackerState,
};
use swarmd_torrent_libt::TrackerEntry;
use tracing::{debug, warn};

/// Outcome of applying an event to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// State changed; the event should be published.
    Changed,
    /// The event carried nothing new or was deferred.
    Unchanged,
    /// No torrent with that id is registered.
    Unknown,
}

/// Owned copy of one torrent's full state.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentSnapshot {
    /// Static torrent record.
    pub torrent: Torrent,
    /// Current lifecycle state.
    pub state: TorrentStateCode,
    /// Last error message, set when `state` is [`TorrentStateCode::Error`].
    pub error: Option<String>,
    /// Integer progress, 0 to 100.
    pub progress: u8,
    /// Latest transfer counters reported by the session.
    pub stats: TransferStats,
    /// Whether piece layout and file list are known.
    pub metadata_known: bool,
    /// Files discovered in the metadata.
    pub files: Vec<DiscoveredFile>,
    /// Verified pieces; empty until metadata arrives.
    pub pieces: PieceBitmap,
    /// Trackers in announce-list order.
    pub trackers: Vec<TrackerState>,
    /// Currently connected peers.
    pub peers: Vec<PeerState>,
    piece_length: u64,
    finish_pending: Option<TorrentStateCode>,
}

impl TorrentSnapshot {
    /// Fresh snapshot for a torrent that has just been admitted.
    #[must_use]
    pub fn new(torrent: Torrent, trackers: &[TrackerEntry]) -> Self {
        Self {
            torrent,
            state: TorrentStateCode::Added,
            error: None,
            progress: 0,
            stats: TransferStats::default(),
            metadata_known: false,
            files: Vec::new(),
            pieces: PieceBitmap::default(),
            trackers: trackers
                .iter()
                .map(|entry| TrackerState::new(entry.url.clone(), entry.tier))
                .collect(),
            peers: Vec::new(),
            piece_length: 0,
            finish_pending: None,
        }
    }

    /// Torrent identifier.
    #[must_use]
    pub const fn id(&self) -> &TorrentId {
        &self.torrent.id
    }

    /// Basic status view.
    #[must_use]
    pub fn basic(&self) -> BasicState {
        let remaining = self.stats.bytes_total.saturating_sub(self.stats.bytes_done);
        let eta_seconds = (self.state.is_progressing() && self.stats.download_bps > 0)
            .then(|| remaining.div_ceil(self.stats.download_bps));
        BasicState {
            id: self.torrent.id.clone(),
            name: self.torrent.name.clone(),
            state: self.state,
            progress: self.progress,
            download_bps: self.stats.download_bps,
            upload_bps: self.stats.upload_bps,
            eta_seconds,
            connected_peers: count(self.peers.len()),
            total_bytes: self.stats.bytes_total,
            done_bytes: self.stats.bytes_done,
            error: self.error.clone(),
        }
    }

    /// Replace the per-file priorities. A finish that was only waiting on
    /// pieces of now-skipped files is applied immediately.
    pub fn set_file_priorities(&mut self, priorities: Vec<FilePriority>) {
        self.torrent.file_priorities = priorities;
        self.promote_pending_finish();
    }

    /// Whether every piece overlapping a wanted file is verified.
    ///
    /// Without explicit priorities every file is wanted, so this is the full
    /// bitmap. Pieces shared with a skipped file still count when they also
    /// hold wanted bytes.
    #[must_use]
    pub fn selection_complete(&self) -> bool {
        let priorities = &self.torrent.file_priorities;
        if self.pieces.is_empty()
            || self.piece_length == 0
            || priorities.is_empty()
            || priorities.len() != self.files.len()
        {
            return self.pieces.is_complete();
        }
        let mut offset = 0_u64;
        for (file, priority) in self.files.iter().zip(priorities) {
            let start = offset;
            offset += file.size_bytes;
            if !priority.is_wanted() || file.size_bytes == 0 {
                continue;
            }
            let first = start / self.piece_length;
            let last = (offset - 1) / self.piece_length;
            if (first..=last)
                .any(|piece| !self.pieces.get(usize::try_from(piece).unwrap_or(usize::MAX)))
            {
                return false;
            }
        }
        true
    }

    /// Detailed status view.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn advanced(&self) -> AdvancedState {
        let seeds = count(self.peers.iter().filter(|peer| peer.flags.seed).count());
        let peer_count = count(self.peers.len());
        let share_ratio = if self.stats.total_downloaded == 0 {
            0.0
        } else {
            self.stats.total_uploaded as f64 / self.stats.total_downloaded as f64
        };
        let availability = self
            .peers
            .iter()
            .map(|peer| f64::from(peer.progress) / 100.0)
            .sum();
        AdvancedState {
            basic: self.basic(),
            save_path: self.torrent.save_path.clone(),
            added_at: self.torrent.added_at,
            seeds,
            leechers: peer_count - seeds,
            total_downloaded: self.stats.total_downloaded,
            total_uploaded: self.stats.total_uploaded,
            share_ratio,
            availability,
            tracker_count: count(self.trackers.len()),
            working_trackers: count(
                self.trackers
                    .iter()
                    .filter(|tracker| tracker.status == swarmd_events::TrackerStatus::Working)
                    .count(),
            ),
            peer_count,
            active_seconds: self.stats.active_seconds,
            pieces_total: count(self.pieces.len()),
            pieces_done: count(self.pieces.count_done()),
        }
    }

    fn apply(&mut self, event: &Event) -> Applied {
        let before = self.clone();
        match event {
            Event::MetadataReceived {
                name,
                piece_length,
                piece_count,
                total_bytes,
                files,
                ..
            } => {
                self.piece_length = *piece_length;
                self.apply_metadata(name, *piece_count, *total_bytes, files);
            }
            Event::StateChanged { state, stats, .. } => self.apply_state(*state, stats.as_ref()),
            Event::PieceFinished { piece_index, .. } => self.apply_piece(*piece_index),
            Event::TrackerReply {
                tracker_url,
                status,
                detail,
                ..
            } => {
                let tracker = match self
                    .trackers
                    .iter()
                    .position(|tracker| &tracker.url == tracker_url)
                {
                    Some(index) => &mut self.trackers[index],
                    None => {
                        let tier = self.trackers.last().map_or(0, |last| last.tier + 1);
                        self.trackers.push(TrackerState::new(tracker_url.clone(), tier));
                        let last = self.trackers.len() - 1;
                        &mut self.trackers[last]
                    }
                };
                tracker.status = *status;
                tracker.message.clone_from(&detail.message);
                tracker.next_announce = detail.next_announce;
                tracker.seeds = detail.seeds;
                tracker.leechers = detail.leechers;
                tracker.peers = detail.peers_returned;
            }
            Event::PeerConnected { peer, .. } => {
                let peer = peer_state(peer);
                match self
                    .peers
                    .iter_mut()
                    .find(|known| known.endpoint == peer.endpoint)
                {
                    Some(known) => *known = peer,
                    None => self.peers.push(peer),
                }
            }
            Event::PeerDisconnected { peer, .. } => {
                self.peers.retain(|known| known.endpoint != *peer);
            }
            Event::TorrentError { message, .. } => {
                self.state = TorrentStateCode::Error;
                self.error = Some(message.clone());
                self.finish_pending = None;
            }
            Event::TorrentFinished { .. } => {
                if !self.selection_complete() {
                    debug!(
                        torrent_id = %self.torrent.id,
                        done = self.pieces.count_done(),
                        total = self.pieces.len(),
                        "finish deferred until every wanted piece is verified"
                    );
                    return Applied::Unchanged;
                }
                return Applied::Changed;
            }
            Event::TorrentAdded { .. } | Event::TorrentRemoved { .. } | Event::HealthChanged { .. } => {
                return Applied::Unchanged;
            }
        }
        if *self == before {
            Applied::Unchanged
        } else {
            Applied::Changed
        }
    }

    fn apply_metadata(
        &mut self,
        name: &str,
        piece_count: u32,
        total_bytes: u64,
        files: &[DiscoveredFile],
    ) {
        if self.torrent.name == self.torrent.id.as_str() {
            self.torrent.name = name.to_string();
        }
        let pieces = piece_count as usize;
        if self.pieces.is_empty() {
            self.pieces = PieceBitmap::new(pieces);
        } else if self.pieces.len() != pieces {
            warn!(
                torrent_id = %self.torrent.id,
                known = self.pieces.len(),
                reported = pieces,
                "metadata reported a different piece count; keeping the original bitmap"
            );
        }
        self.files = files.to_vec();
        self.stats.bytes_total = total_bytes;
        self.metadata_known = true;
    }

    fn apply_state(&mut self, reported: TorrentStateCode, stats: Option<&TransferStats>) {
        if self.state == TorrentStateCode::Error && reported != TorrentStateCode::Error {
            debug!(
                torrent_id = %self.torrent.id,
                state = reported.as_str(),
                "ignoring state change for errored torrent"
            );
            return;
        }
        if let Some(stats) = stats {
            self.stats = stats.clone();
        }

        let effective = if reported.is_complete() && !self.selection_complete() {
            self.finish_pending = Some(reported);
            if self.state.is_progressing() {
                self.state
            } else {
                TorrentStateCode::Downloading
            }
        } else {
            self.finish_pending = None;
            reported
        };

        let computed = if effective.is_complete() {
            100
        } else {
            percent(self.stats.bytes_done, self.stats.bytes_total)
        };
        self.progress = if effective.is_progressing() && self.state.is_progressing() {
            self.progress.max(computed)
        } else {
            computed
        };
        self.state = effective;
    }

    fn apply_piece(&mut self, piece_index: u32) {
        let index = piece_index as usize;
        if index >= self.pieces.len() {
            warn!(
                torrent_id = %self.torrent.id,
                piece_index,
                pieces = self.pieces.len(),
                "piece index outside bitmap"
            );
            return;
        }
        self.pieces.set(index);
        self.promote_pending_finish();
    }

    fn promote_pending_finish(&mut self) {
        if self.selection_complete()
            && let Some(state) = self.finish_pending.take()
        {
            self.state = state;
            self.progress = 100;
        }
    }
}

/// Thread-safe registry of torrent snapshots.
#[derive(Clone, Default)]
pub struct TorrentRegistry {
    inner: Arc<RwLock<HashMap<TorrentId, TorrentSnapshot>>>,
}

impl TorrentRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TorrentId, TorrentSnapshot>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TorrentId, TorrentSnapshot>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of one torrent's state.
    #[must_use]
    pub fn get(&self, id: &TorrentId) -> Option<TorrentSnapshot> {
        self.read().get(id).cloned()
    }

    /// Copies of every torrent, oldest first.
    #[must_use]
    pub fn get_all(&self) -> Vec<TorrentSnapshot> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by(|left, right| {
            left.torrent
                .added_at
                .cmp(&right.torrent.added_at)
                .then_with(|| left.torrent.id.cmp(&right.torrent.id))
        });
        all
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &TorrentId) -> bool {
        self.read().contains_key(id)
    }

    /// Number of registered torrents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no torrents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Register a new torrent. Returns `false` if the id is already present.
    pub fn insert(&self, snapshot: TorrentSnapshot) -> bool {
        let mut torrents = self.write();
        if torrents.contains_key(snapshot.id()) {
            return false;
        }
        torrents.insert(snapshot.id().clone(), snapshot);
        true
    }

    /// Mutate an existing entry. Unknown ids are left alone.
    pub fn upsert<F>(&self, id: &TorrentId, mutate: F) -> bool
    where
        F: FnOnce(&mut TorrentSnapshot),
    {
        if let Some(snapshot) = self.write().get_mut(id) {
            mutate(snapshot);
            true
        } else {
            warn!(torrent_id = %id, "update for unknown torrent ignored");
            false
        }
    }

    /// Remove an entry. Only the first of concurrent callers receives it.
    pub fn remove(&self, id: &TorrentId) -> Option<TorrentSnapshot> {
        self.write().remove(id)
    }

    /// Fold an event into the matching entry.
    pub fn apply(&self, event: &Event) -> Applied {
        let Some(id) = event.torrent_id() else {
            return Applied::Unchanged;
        };
        self.write()
            .get_mut(id)
            .map_or(Applied::Unknown, |snapshot| snapshot.apply(event))
    }

    /// Session-wide totals.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.read()
            .values()
            .fold(SessionState::default(), |mut totals, snapshot| {
                totals.torrents += 1;
                if snapshot.state.is_progressing()
                    || snapshot.state == TorrentStateCode::DownloadingMetadata
                {
                    totals.downloading += 1;
                }
                if snapshot.state.is_complete() {
                    totals.completed += 1;
                }
                totals.download_bps += snapshot.stats.download_bps;
                totals.upload_bps += snapshot.stats.upload_bps;
                totals.total_downloaded += snapshot.stats.total_downloaded;
                totals.total_uploaded += snapshot.stats.total_uploaded;
                totals
            })
    }
}

fn peer_state(peer: &PeerInfo) -> PeerState {
    PeerState {
        endpoint: peer.endpoint,
        client: peer.client.clone(),
        progress: u8::try_from((peer.progress_permille / 10).min(100)).unwrap_or(100),
        download_bps: peer.download_bps,
        upload_bps: peer.upload_bps,
        flags: peer.flags,
    }
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = u128::from(done.min(total)) * 100 / u128::from(total);
    u8::try_from(scaled).unwrap_or(100)
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use swarmd_events::{AnnounceDetail, PeerFlags, TrackerStatus};
    use swarmd_torrent_core::TorrentSource;

    fn torrent(seed: u8) -> Torrent {
        let id = TorrentId::from_info_hash(&[seed; 20]);
        Torrent {
            name: id.as_str().to_string(),
            id,
            source: TorrentSource::magnet("magnet:?xt=urn:btih:00"),
            save_path: "/tmp/swarmd".into(),
            file_priorities: Vec::new(),
            added_at: Utc::now(),
        }
    }

    fn registered(seed: u8) -> (TorrentRegistry, TorrentId) {
        let registry = TorrentRegistry::new();
        let snapshot = TorrentSnapshot::new(
            torrent(seed),
            &[TrackerEntry {
                url: "http://t.test/announce".into(),
                tier: 0,
            }],
        );
        let id = snapshot.id().clone();
        assert!(registry.insert(snapshot));
        (registry, id)
    }

    fn metadata(id: &TorrentId, pieces: u32) -> Event {
        Event::MetadataReceived {
            torrent_id: id.clone(),
            name: "payload".into(),
            piece_length: 10,
            piece_count: pieces,
            total_bytes: u64::from(pieces) * 10,
            files: vec![DiscoveredFile {
                path: "payload".into(),
                size_bytes: u64::from(pieces) * 10,
            }],
        }
    }

    fn state(id: &TorrentId, state: TorrentStateCode, done: u64) -> Event {
        Event::StateChanged {
            torrent_id: id.clone(),
            state,
            stats: Some(TransferStats {
                bytes_done: done,
                bytes_total: 40,
                ..TransferStats::default()
            }),
        }
    }

    fn peer(last: u8, seed: bool) -> PeerInfo {
        PeerInfo {
            endpoint: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), 6881),
            client: "test".into(),
            progress_permille: if seed { 1_000 } else { 250 },
            download_bps: 0,
            upload_bps: 0,
            flags: PeerFlags {
                seed,
                ..PeerFlags::default()
            },
        }
    }

    #[test]
    fn insert_rejects_duplicates_and_remove_claims_once() {
        let (registry, id) = registered(1);
        assert!(!registry.insert(TorrentSnapshot::new(torrent(1), &[])));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn events_for_unknown_ids_are_reported() {
        let registry = TorrentRegistry::new();
        let id = TorrentId::from_info_hash(&[3; 20]);
        assert_eq!(registry.apply(&metadata(&id, 4)), Applied::Unknown);
        assert!(!registry.upsert(&id, |snapshot| snapshot.progress = 50));
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn metadata_fixes_bitmap_length_and_renames_placeholder() {
        let (registry, id) = registered(2);
        assert_eq!(registry.apply(&metadata(&id, 4)), Applied::Changed);
        let snapshot = registry.get(&id).expect("registered");
        assert_eq!(snapshot.torrent.name, "payload");
        assert_eq!(snapshot.pieces.len(), 4);

        assert_eq!(registry.apply(&metadata(&id, 9)), Applied::Unchanged);
        assert_eq!(registry.get(&id).expect("registered").pieces.len(), 4);
    }

    #[test]
    fn progress_never_regresses_while_downloading() {
        let (registry, id) = registered(4);
        registry.apply(&metadata(&id, 4));
        registry.apply(&state(&id, TorrentStateCode::Downloading, 30));
        assert_eq!(registry.get(&id).expect("registered").progress, 75);

        registry.apply(&state(&id, TorrentStateCode::Downloading, 10));
        assert_eq!(registry.get(&id).expect("registered").progress, 75);

        registry.apply(&state(&id, TorrentStateCode::Paused, 10));
        assert_eq!(registry.get(&id).expect("registered").progress, 25);
    }

    #[test]
    fn finish_waits_for_full_bitmap() {
        let (registry, id) = registered(5);
        registry.apply(&metadata(&id, 2));
        registry.apply(&state(&id, TorrentStateCode::Downloading, 10));
        registry.apply(&Event::PieceFinished {
            torrent_id: id.clone(),
            piece_index: 0,
        });
        assert_eq!(
            registry.apply(&Event::TorrentFinished {
                torrent_id: id.clone()
            }),
            Applied::Unchanged
        );
        registry.apply(&state(&id, TorrentStateCode::Finished, 10));
        let snapshot = registry.get(&id).expect("registered");
        assert_eq!(snapshot.state, TorrentStateCode::Downloading);
        assert!(snapshot.progress < 100);

        registry.apply(&Event::PieceFinished {
            torrent_id: id.clone(),
            piece_index: 1,
        });
        let snapshot = registry.get(&id).expect("registered");
        assert_eq!(snapshot.state, TorrentStateCode::Finished);
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.pieces.is_complete());
    }

    #[test]
    fn skipped_files_do_not_hold_back_finish() {
        let (registry, id) = registered(10);
        registry.upsert(&id, |snapshot| {
            snapshot.set_file_priorities(vec![FilePriority::High, FilePriority::Skip]);
        });
        registry.apply(&Event::MetadataReceived {
            torrent_id: id.clone(),
            name: "pair".into(),
            piece_length: 10,
            piece_count: 4,
            total_bytes: 40,
            files: vec![
                DiscoveredFile {
                    path: "pair/a.bin".into(),
                    size_bytes: 20,
                },
                DiscoveredFile {
                    path: "pair/b.bin".into(),
                    size_bytes: 20,
                },
            ],
        });
        registry.apply(&Event::PieceFinished {
            torrent_id: id.clone(),
            piece_index: 0,
        });
        registry.apply(&state(&id, TorrentStateCode::Finished, 10));
        assert_eq!(
            registry.get(&id).expect("registered").state,
            TorrentStateCode::Downloading
        );

        registry.apply(&Event::PieceFinished {
            torrent_id: id.clone(),
            piece_index: 1,
        });
        let snapshot = registry.get(&id).expect("registered");
        assert_eq!(snapshot.state, TorrentStateCode::Finished);
        assert_eq!(snapshot.progress, 100);
        assert!(snapshot.selection_complete());
        assert!(!snapshot.pieces.is_complete());

        registry.upsert(&id, |snapshot| {
            snapshot.set_file_priorities(vec![FilePriority::High, FilePriority::Low]);
        });
        assert!(!registry.get(&id).expect("registered").selection_complete());
    }

    #[test]
    fn error_is_sticky() {
        let (registry, id) = registered(6);
        registry.apply(&Event::TorrentError {
            torrent_id: id.clone(),
            message: "disk full".into(),
        });
        assert_eq!(
            registry.apply(&state(&id, TorrentStateCode::Downloading, 0)),
            Applied::Unchanged
        );
        let basic = registry.get(&id).expect("registered").basic();
        assert_eq!(basic.state, TorrentStateCode::Error);
        assert_eq!(basic.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn trackers_and_peers_track_announces() {
        let (registry, id) = registered(7);
        let reply = |url: &str, status| Event::TrackerReply {
            torrent_id: id.clone(),
            tracker_url: url.into(),
            status,
            detail: AnnounceDetail {
                seeds: Some(4),
                peers_returned: 2,
                ..AnnounceDetail::default()
            },
        };
        assert_eq!(
            registry.apply(&reply("http://t.test/announce", TrackerStatus::Working)),
            Applied::Changed
        );
        assert_eq!(
            registry.apply(&reply("udp://other.test:1/a", TrackerStatus::NotWorking)),
            Applied::Changed
        );
        registry.apply(&Event::PeerConnected {
            torrent_id: id.clone(),
            peer: peer(1, true),
        });
        registry.apply(&Event::PeerConnected {
            torrent_id: id.clone(),
            peer: peer(2, false),
        });

        let snapshot = registry.get(&id).expect("registered");
        assert_eq!(snapshot.trackers.len(), 2);
        assert_eq!(snapshot.trackers[0].seeds, Some(4));
        assert_eq!(snapshot.trackers[1].tier, 1);
        let advanced = snapshot.advanced();
        assert_eq!(advanced.working_trackers, 1);
        assert_eq!((advanced.seeds, advanced.leechers), (1, 1));
        assert!((advanced.availability - 1.25).abs() < f64::EPSILON);

        assert_eq!(
            registry.apply(&Event::PeerDisconnected {
                torrent_id: id.clone(),
                peer: peer(1, true).endpoint,
            }),
            Applied::Changed
        );
        assert_eq!(
            registry.apply(&Event::PeerDisconnected {
                torrent_id: id.clone(),
                peer: peer(1, true).endpoint,
            }),
            Applied::Unchanged
        );
        assert_eq!(registry.get(&id).expect("registered").peers.len(), 1);
    }

    #[test]
    fn session_totals_aggregate_entries() {
        let (registry, first) = registered(8);
        let second = TorrentSnapshot::new(torrent(9), &[]);
        let second_id = second.id().clone();
        registry.insert(second);
        registry.apply(&metadata(&first, 4));
        registry.apply(&state(&first, TorrentStateCode::Downloading, 20));
        registry.apply(&metadata(&second_id, 4));
        for index in 0..4 {
            registry.apply(&Event::PieceFinished {
                torrent_id: second_id.clone(),
                piece_index: index,
            });
        }
        registry.apply(&state(&second_id, TorrentStateCode::Seeding, 40));

        let totals = registry.session_state();
        assert_eq!(totals.torrents, 2);
        assert_eq!(totals.downloading, 1);
        assert_eq!(totals.completed, 1);
        assert_eq!(registry.get_all().len(), 2);
    }
}
