//! In-process protocol engine driving torrents through their lifecycle on a worker thread.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use swarmd_events::{
    AnnounceDetail, DiscoveredFile, PeerFlags, PeerInfo, TorrentId, TorrentStateCode,
    TrackerStatus, TransferStats,
};
use swarmd_torrent_core::FilePriority;
use tracing::{debug, warn};

use super::{NativeSession, SwarmDirectory};
use crate::alert::{
    AlertSink, ErrorPayload, MetadataPayload, NativeAlert, PeerGonePayload, PeerPayload,
    PiecePayload, RemovedPayload, StatePayload, TrackerPayload, kinds,
};
use crate::error::NativeError;
use crate::metainfo::{TorrentMetadata, TrackerEntry};
use crate::types::{AddParams, NativeHandle, RemovalOutcome, SimulationConfig};

const CLIENTS: [&str; 4] = [
    "qBittorrent/4.6.2",
    "Transmission/4.0.5",
    "libtorrent/2.0.9",
    "Deluge/2.1.1",
];
const ANNOUNCE_INTERVAL_MINUTES: i64 = 30;

/// Embedded protocol engine that simulates a healthy swarm.
///
/// Torrents with metadata go `checking → downloading → finished|seeding`;
/// magnets wait in `downloading_metadata` until their content is published
/// in the [`SwarmDirectory`].
pub struct SimulatedSession {
    config: SimulationConfig,
    swarm: SwarmDirectory,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    running: AtomicBool,
    state: Mutex<SimState>,
}

struct SimState {
    sink: Option<AlertSink>,
    torrents: BTreeMap<NativeHandle, SimTorrent>,
    next_handle: u64,
    rng: StdRng,
    ticks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingMetadata,
    Checking,
    Downloading,
    Finished,
    Seeding,
    Failed,
}

impl Phase {
    const fn code(self) -> TorrentStateCode {
        match self {
            Self::AwaitingMetadata => TorrentStateCode::DownloadingMetadata,
            Self::Checking => TorrentStateCode::Checking,
            Self::Downloading => TorrentStateCode::Downloading,
            Self::Finished => TorrentStateCode::Finished,
            Self::Seeding => TorrentStateCode::Seeding,
            Self::Failed => TorrentStateCode::Error,
        }
    }
}

struct SimTorrent {
    id: TorrentId,
    save_path: PathBuf,
    trackers: Vec<TrackerEntry>,
    metadata: Option<TorrentMetadata>,
    priorities: Vec<FilePriority>,
    pieces: Vec<bool>,
    phase: Phase,
    paused: bool,
    announced: bool,
    peers: Vec<PeerInfo>,
    downloaded: u64,
    uploaded: u64,
    active_ticks: u64,
    download_bps: u64,
    upload_bps: u64,
}

impl SimulatedSession {
    /// Create a stopped session; call [`NativeSession::start`] before use.
    #[must_use]
    pub fn new(config: SimulationConfig, swarm: SwarmDirectory) -> Self {
        let rng = StdRng::seed_from_u64(config.rng_seed);
        Self {
            config,
            swarm,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                state: Mutex::new(SimState {
                    sink: None,
                    torrents: BTreeMap::new(),
                    next_handle: 1,
                    rng,
                    ticks: 0,
                }),
            }),
            worker: None,
        }
    }

    /// Swarm directory this session resolves magnets against.
    #[must_use]
    pub fn swarm(&self) -> &SwarmDirectory {
        &self.swarm
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_running(&self, operation: &'static str) -> Result<()> {
        if self.shared.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NativeError::SessionStopped { operation }.into())
        }
    }
}

impl NativeSession for SimulatedSession {
    fn start(&mut self, sink: AlertSink) -> Result<()> {
        if self.worker.is_some() {
            return Err(anyhow!("simulated session already started"));
        }
        self.lock().sink = Some(sink);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let swarm = self.swarm.clone();
        let worker = thread::Builder::new()
            .name("swarmd-native".into())
            .spawn(move || run_loop(&shared, &config, &swarm))
            .context("failed to spawn native session worker")?;
        self.worker = Some(worker);
        debug!(tick_ms = ?self.config.tick_interval, "simulated session started");
        Ok(())
    }

    fn add_torrent(&mut self, params: &AddParams) -> Result<NativeHandle> {
        self.ensure_running("add_torrent")?;
        let mut state = self.lock();
        if state.torrents.values().any(|torrent| torrent.id == params.id) {
            return Err(NativeError::InvalidInput {
                field: "id",
                reason: "torrent already present in session",
            }
            .into());
        }

        let metadata = params.info.metadata.clone();
        if let Some(meta) = metadata.as_ref() {
            check_priorities(meta, &params.priorities)?;
            prepare_files(&params.save_path, meta).map_err(|source| {
                NativeError::SaveDirectory {
                    path: params.save_path.clone(),
                    source,
                }
            })?;
        }

        let handle = NativeHandle(state.next_handle);
        state.next_handle += 1;

        let torrent = SimTorrent {
            id: params.id.clone(),
            save_path: params.save_path.clone(),
            trackers: params.info.trackers.clone(),
            pieces: metadata
                .as_ref()
                .map(|meta| vec![false; meta.piece_count as usize])
                .unwrap_or_default(),
            phase: if metadata.is_some() {
                Phase::Checking
            } else {
                Phase::AwaitingMetadata
            },
            metadata,
            priorities: params.priorities.clone(),
            paused: params.paused,
            announced: false,
            peers: Vec::new(),
            downloaded: 0,
            uploaded: 0,
            active_ticks: 0,
            download_bps: 0,
            upload_bps: 0,
        };

        if let Some(meta) = torrent.metadata.as_ref() {
            emit(&state.sink, metadata_alert(&torrent.id, meta));
        }
        emit(&state.sink, torrent.state_alert(kinds::STATE_CHANGED, &self.config));
        debug!(torrent_id = %params.id, %handle, "native torrent added");
        state.torrents.insert(handle, torrent);
        Ok(handle)
    }

    fn remove_torrent(&mut self, handle: NativeHandle, with_data: bool) -> Result<RemovalOutcome> {
        self.ensure_running("remove_torrent")?;
        let mut state = self.lock();
        let torrent = state
            .torrents
            .remove(&handle)
            .ok_or(NativeError::InvalidHandle {
                operation: "remove_torrent",
            })?;

        let data_error = if with_data {
            delete_payload(&torrent)
        } else {
            None
        };
        emit(
            &state.sink,
            NativeAlert::torrent(
                kinds::TORRENT_REMOVED,
                torrent.id.as_str(),
                &RemovedPayload { with_data },
            ),
        );
        debug!(torrent_id = %torrent.id, %handle, with_data, "native torrent removed");
        Ok(RemovalOutcome { data_error })
    }

    fn pause(&mut self, handle: NativeHandle) -> Result<()> {
        self.ensure_running("pause")?;
        let mut guard = self.lock();
        let SimState { sink, torrents, .. } = &mut *guard;
        let torrent = torrents
            .get_mut(&handle)
            .ok_or(NativeError::InvalidHandle { operation: "pause" })?;
        if torrent.paused {
            return Ok(());
        }
        if torrent.phase == Phase::Failed {
            return Err(NativeError::InvalidInput {
                field: "state",
                reason: "torrent is in error",
            }
            .into());
        }
        torrent.paused = true;
        torrent.disconnect_all(sink, "paused");
        emit(sink, torrent.state_alert(kinds::STATE_CHANGED, &self.config));
        Ok(())
    }

    fn resume(&mut self, handle: NativeHandle) -> Result<()> {
        self.ensure_running("resume")?;
        let mut guard = self.lock();
        let SimState { sink, torrents, .. } = &mut *guard;
        let torrent = torrents
            .get_mut(&handle)
            .ok_or(NativeError::InvalidHandle { operation: "resume" })?;
        if !torrent.paused {
            return Ok(());
        }
        torrent.paused = false;
        torrent.announced = false;
        emit(sink, torrent.state_alert(kinds::STATE_CHANGED, &self.config));
        Ok(())
    }

    fn set_priorities(&mut self, handle: NativeHandle, priorities: &[FilePriority]) -> Result<()> {
        self.ensure_running("set_priorities")?;
        let mut guard = self.lock();
        let SimState { sink, torrents, .. } = &mut *guard;
        let torrent = torrents.get_mut(&handle).ok_or(NativeError::InvalidHandle {
            operation: "set_priorities",
        })?;
        if let Some(meta) = torrent.metadata.as_ref() {
            check_priorities(meta, priorities)?;
        }
        torrent.priorities = priorities.to_vec();

        let reopened = matches!(torrent.phase, Phase::Finished | Phase::Seeding)
            && torrent.next_missing_pieces(1).first().is_some();
        if reopened {
            torrent.phase = Phase::Downloading;
            torrent.announced = false;
            if !torrent.paused {
                emit(sink, torrent.state_alert(kinds::STATE_CHANGED, &self.config));
            }
        }
        Ok(())
    }

    fn query_pieces(&self, handle: NativeHandle) -> Result<Vec<bool>> {
        self.ensure_running("query_pieces")?;
        let state = self.lock();
        let torrent = state.torrents.get(&handle).ok_or(NativeError::InvalidHandle {
            operation: "query_pieces",
        })?;
        Ok(torrent.pieces.clone())
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("native session worker panicked during shutdown");
        }
        self.lock().sink = None;
        Ok(())
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_loop(shared: &Shared, config: &SimulationConfig, swarm: &SwarmDirectory) {
    while shared.running.load(Ordering::Acquire) {
        thread::sleep(config.tick_interval);
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tick(config, swarm);
    }
    debug!("native session worker exiting");
}

impl SimState {
    fn tick(&mut self, config: &SimulationConfig, swarm: &SwarmDirectory) {
        self.ticks += 1;
        let Self {
            sink,
            torrents,
            rng,
            ticks,
            ..
        } = self;

        if config.stats_every_ticks > 0 && *ticks % u64::from(config.stats_every_ticks) == 0 {
            emit(
                sink,
                NativeAlert::session(
                    kinds::SESSION_STATS,
                    &json!({ "torrents": torrents.len(), "ticks": *ticks }),
                ),
            );
        }

        for torrent in torrents.values_mut() {
            if torrent.paused || torrent.phase == Phase::Failed {
                continue;
            }
            torrent.active_ticks += 1;
            match torrent.phase {
                Phase::AwaitingMetadata => torrent.resolve_metadata(sink, rng, config, swarm),
                Phase::Checking => {
                    torrent.phase = Phase::Downloading;
                    emit(sink, torrent.state_alert(kinds::STATE_CHANGED, config));
                }
                Phase::Downloading => torrent.download(sink, rng, config),
                Phase::Seeding => torrent.seed(sink, config),
                Phase::Finished | Phase::Failed => {}
            }
        }
    }
}

impl SimTorrent {
    fn visible_state(&self) -> TorrentStateCode {
        if self.paused {
            TorrentStateCode::Paused
        } else {
            self.phase.code()
        }
    }

    fn stats(&self, config: &SimulationConfig) -> TransferStats {
        let bytes_done = self.metadata.as_ref().map_or(0, |meta| {
            self.pieces
                .iter()
                .enumerate()
                .filter(|(_, done)| **done)
                .map(|(index, _)| meta.piece_size(u32::try_from(index).unwrap_or(u32::MAX)))
                .sum()
        });
        let tick_ms = u64::try_from(config.tick_interval.as_millis()).unwrap_or(u64::MAX);
        TransferStats {
            bytes_done,
            bytes_total: self.metadata.as_ref().map_or(0, |meta| meta.total_bytes),
            download_bps: self.download_bps,
            upload_bps: self.upload_bps,
            total_downloaded: self.downloaded,
            total_uploaded: self.uploaded,
            active_seconds: self.active_ticks.saturating_mul(tick_ms) / 1_000,
        }
    }

    fn state_alert(&self, kind: &str, config: &SimulationConfig) -> NativeAlert {
        NativeAlert::torrent(
            kind,
            self.id.as_str(),
            &StatePayload {
                state: self.visible_state(),
                stats: Some(self.stats(config)),
            },
        )
    }

    fn resolve_metadata(
        &mut self,
        sink: &Option<AlertSink>,
        rng: &mut StdRng,
        config: &SimulationConfig,
        swarm: &SwarmDirectory,
    ) {
        if !self.announced {
            self.announce(sink, rng, config);
        }
        let Some(meta) = swarm.lookup(&self.id) else {
            return;
        };
        if let Err(err) = prepare_files(&self.save_path, &meta) {
            self.fail(sink, format!("failed to prepare payload files: {err}"), config);
            return;
        }
        if check_priorities(&meta, &self.priorities).is_err() {
            warn!(
                torrent_id = %self.id,
                supplied = self.priorities.len(),
                files = meta.files.len(),
                "priority count does not match metadata; using defaults"
            );
            self.priorities.clear();
        }
        self.pieces = vec![false; meta.piece_count as usize];
        emit(sink, metadata_alert(&self.id, &meta));
        self.metadata = Some(meta);
        self.phase = Phase::Checking;
        emit(sink, self.state_alert(kinds::STATE_CHANGED, config));
    }

    fn fail(&mut self, sink: &Option<AlertSink>, message: String, config: &SimulationConfig) {
        emit(
            sink,
            NativeAlert::torrent(kinds::FILE_ERROR, self.id.as_str(), &ErrorPayload { message }),
        );
        self.phase = Phase::Failed;
        self.disconnect_all(sink, "torrent error");
        emit(sink, self.state_alert(kinds::STATE_CHANGED, config));
    }

    fn announce(&mut self, sink: &Option<AlertSink>, rng: &mut StdRng, config: &SimulationConfig) {
        self.announced = true;
        let mut reachable = self.trackers.is_empty();
        for tracker in &self.trackers {
            let scheme = tracker.url.split("://").next().unwrap_or_default();
            let working = matches!(scheme, "http" | "https" | "udp");
            let (kind, payload) = if working {
                reachable = true;
                (
                    kinds::TRACKER_REPLY,
                    TrackerPayload {
                        url: tracker.url.clone(),
                        status: TrackerStatus::Working,
                        detail: AnnounceDetail {
                            message: None,
                            seeds: Some(rng.random_range(1..50)),
                            leechers: Some(rng.random_range(0..50)),
                            peers_returned: config.peers_per_torrent,
                            next_announce: Some(
                                Utc::now() + ChronoDuration::minutes(ANNOUNCE_INTERVAL_MINUTES),
                            ),
                        },
                    },
                )
            } else {
                (
                    kinds::TRACKER_ERROR,
                    TrackerPayload {
                        url: tracker.url.clone(),
                        status: TrackerStatus::NotWorking,
                        detail: AnnounceDetail {
                            message: Some("unsupported tracker protocol".into()),
                            ..AnnounceDetail::default()
                        },
                    },
                )
            };
            emit(sink, NativeAlert::torrent(kind, self.id.as_str(), &payload));
        }

        if reachable {
            while self.peers.len() < config.peers_per_torrent as usize {
                let peer = random_peer(rng, self.peers.is_empty());
                if self.peers.iter().any(|known| known.endpoint == peer.endpoint) {
                    continue;
                }
                emit(
                    sink,
                    NativeAlert::torrent(
                        kinds::PEER_CONNECT,
                        self.id.as_str(),
                        &PeerPayload { peer: peer.clone() },
                    ),
                );
                self.peers.push(peer);
            }
        }
    }

    fn disconnect_all(&mut self, sink: &Option<AlertSink>, reason: &str) {
        for peer in self.peers.drain(..) {
            emit(
                sink,
                NativeAlert::torrent(
                    kinds::PEER_DISCONNECTED,
                    self.id.as_str(),
                    &PeerGonePayload {
                        endpoint: peer.endpoint,
                        reason: Some(reason.to_string()),
                    },
                ),
            );
        }
        self.download_bps = 0;
        self.upload_bps = 0;
    }

    fn piece_priorities(&self) -> Vec<u8> {
        let Some(meta) = self.metadata.as_ref() else {
            return Vec::new();
        };
        let mut levels = vec![0_u8; meta.piece_count as usize];
        for index in 0..meta.files.len() {
            let priority = self
                .priorities
                .get(index)
                .copied()
                .unwrap_or_default();
            if let Some((first, last)) = meta.file_pieces(index) {
                for piece in first..=last {
                    if let Some(level) = levels.get_mut(piece as usize) {
                        *level = (*level).max(priority.level());
                    }
                }
            }
        }
        levels
    }

    fn next_missing_pieces(&self, limit: usize) -> Vec<usize> {
        let levels = self.piece_priorities();
        let mut missing: Vec<(u8, usize)> = levels
            .iter()
            .enumerate()
            .filter(|(index, level)| **level > 0 && !self.pieces.get(*index).copied().unwrap_or(true))
            .map(|(index, level)| (*level, index))
            .collect();
        missing.sort_by(|left, right| right.0.cmp(&left.0).then(left.1.cmp(&right.1)));
        missing.into_iter().take(limit).map(|(_, index)| index).collect()
    }

    fn download(&mut self, sink: &Option<AlertSink>, rng: &mut StdRng, config: &SimulationConfig) {
        if !self.announced {
            self.announce(sink, rng, config);
        }
        let Some(meta) = self.metadata.clone() else {
            return;
        };
        if self.peers.is_empty() {
            self.download_bps = 0;
            emit(sink, self.state_alert(kinds::STATE_UPDATE, config));
            return;
        }

        let mut fetched = 0_u64;
        for index in self.next_missing_pieces(config.pieces_per_tick as usize) {
            if let Some(bit) = self.pieces.get_mut(index) {
                *bit = true;
            }
            let piece_index = u32::try_from(index).unwrap_or(u32::MAX);
            fetched += meta.piece_size(piece_index);
            emit(
                sink,
                NativeAlert::torrent(
                    kinds::PIECE_FINISHED,
                    self.id.as_str(),
                    &PiecePayload { piece_index },
                ),
            );
        }
        self.downloaded += fetched;
        self.uploaded += fetched / 4;
        self.download_bps = per_second(fetched, config);
        self.upload_bps = per_second(fetched / 4, config);
        emit(sink, self.state_alert(kinds::STATE_UPDATE, config));

        if self.next_missing_pieces(1).is_empty() {
            self.complete(sink, config);
        }
    }

    fn complete(&mut self, sink: &Option<AlertSink>, config: &SimulationConfig) {
        let whole = self.pieces.iter().all(|done| *done);
        self.download_bps = 0;
        emit(
            sink,
            NativeAlert::torrent(kinds::TORRENT_FINISHED, self.id.as_str(), &json!({})),
        );
        if whole && config.seed_after_finish {
            self.phase = Phase::Seeding;
        } else {
            self.phase = Phase::Finished;
            self.disconnect_all(sink, "download finished");
        }
        emit(sink, self.state_alert(kinds::STATE_CHANGED, config));
    }

    fn seed(&mut self, sink: &Option<AlertSink>, config: &SimulationConfig) {
        let leechers =
            u64::try_from(self.peers.iter().filter(|peer| !peer.flags.seed).count()).unwrap_or(0);
        let piece_length = self.metadata.as_ref().map_or(0, |meta| meta.piece_length);
        let sent = piece_length.saturating_mul(leechers);
        self.uploaded += sent;
        self.upload_bps = per_second(sent, config);
        emit(sink, self.state_alert(kinds::STATE_UPDATE, config));
    }
}

fn per_second(bytes: u64, config: &SimulationConfig) -> u64 {
    let millis = u64::try_from(config.tick_interval.as_millis())
        .unwrap_or(u64::MAX)
        .max(1);
    bytes.saturating_mul(1_000) / millis
}

fn random_peer(rng: &mut StdRng, seed: bool) -> PeerInfo {
    let address = Ipv4Addr::new(
        10,
        rng.random_range(0..=255),
        rng.random_range(0..=255),
        rng.random_range(1..=254),
    );
    let progress_permille = if seed { 1_000 } else { rng.random_range(0..1_000) };
    PeerInfo {
        endpoint: SocketAddr::new(IpAddr::V4(address), rng.random_range(6_881..7_881)),
        client: CLIENTS[rng.random_range(0..CLIENTS.len())].to_string(),
        progress_permille,
        download_bps: 0,
        upload_bps: 0,
        flags: PeerFlags {
            seed,
            incoming: rng.random_bool(0.3),
            encrypted: rng.random_bool(0.5),
            utp: rng.random_bool(0.5),
            choked: false,
            interested: true,
        },
    }
}

fn metadata_alert(id: &TorrentId, meta: &TorrentMetadata) -> NativeAlert {
    NativeAlert::torrent(
        kinds::METADATA_RECEIVED,
        id.as_str(),
        &MetadataPayload {
            name: meta.name.clone(),
            piece_length: meta.piece_length,
            piece_count: meta.piece_count,
            total_bytes: meta.total_bytes,
            files: meta
                .files
                .iter()
                .map(|file| DiscoveredFile {
                    path: file.path.clone(),
                    size_bytes: file.size_bytes,
                })
                .collect(),
        },
    )
}

fn check_priorities(meta: &TorrentMetadata, priorities: &[FilePriority]) -> Result<()> {
    if priorities.is_empty() || priorities.len() == meta.files.len() {
        Ok(())
    } else {
        Err(NativeError::InvalidInput {
            field: "priorities",
            reason: "priority count does not match file count",
        }
        .into())
    }
}

fn prepare_files(save_path: &Path, meta: &TorrentMetadata) -> io::Result<()> {
    fs::create_dir_all(save_path)?;
    for file in &meta.files {
        let path = save_path.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let handle = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        if handle.metadata()?.len() < file.size_bytes {
            handle.set_len(file.size_bytes)?;
        }
    }
    Ok(())
}

fn delete_payload(torrent: &SimTorrent) -> Option<String> {
    let meta = torrent.metadata.as_ref()?;
    let mut failures = Vec::new();
    let mut dirs = Vec::new();
    for file in &meta.files {
        let path = torrent.save_path.join(&file.path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => failures.push(format!("{}: {err}", path.display())),
        }
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == torrent.save_path || !dir.starts_with(&torrent.save_path) {
                break;
            }
            dirs.push(dir.to_path_buf());
            parent = dir.parent();
        }
    }
    dirs.sort();
    dirs.dedup();
    dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
    for dir in dirs {
        let _ = fs::remove_dir(&dir);
    }
    if failures.is_empty() {
        None
    } else {
        Some(failures.join("; "))
    }
}

fn emit(sink: &Option<AlertSink>, alert: NativeAlert) {
    if let Some(sink) = sink
        && sink.send(alert).is_err()
    {
        debug!("alert sink closed; dropping native alert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertReceiver;
    use crate::metainfo::parse_metainfo;
    use std::time::Duration;
    use swarmd_test_support::fixtures::MetainfoBuilder;
    use tokio::sync::mpsc;

    fn started(config: SimulationConfig) -> (SimulatedSession, AlertReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = SimulatedSession::new(config, SwarmDirectory::new());
        session.start(tx).expect("start");
        (session, rx)
    }

    fn params(bytes: &[u8], save_path: &Path) -> AddParams {
        let info = parse_metainfo(bytes).expect("metainfo");
        AddParams {
            id: info.id.clone(),
            info,
            save_path: save_path.to_path_buf(),
            priorities: Vec::new(),
            paused: false,
        }
    }

    async fn collect_until(rx: &mut AlertReceiver, kind: &str) -> Vec<NativeAlert> {
        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(alert) = rx.recv().await {
                let done = alert.kind == kind;
                seen.push(alert);
                if done {
                    break;
                }
            }
        })
        .await
        .expect("alert within timeout");
        seen
    }

    #[tokio::test]
    async fn metainfo_torrent_downloads_to_seeding() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = MetainfoBuilder::new("payload.bin")
            .piece_length(8)
            .file("payload.bin", 60)
            .tracker("http://tracker.test/announce")
            .build();
        let (mut session, mut rx) = started(SimulationConfig::fast());
        let handle = session
            .add_torrent(&params(&fixture.bytes, dir.path()))
            .expect("add");

        let alerts = collect_until(&mut rx, kinds::TORRENT_FINISHED).await;
        let kinds_seen: Vec<&str> = alerts.iter().map(|alert| alert.kind.as_str()).collect();
        assert_eq!(kinds_seen[0], kinds::METADATA_RECEIVED);
        assert!(kinds_seen.contains(&kinds::TRACKER_REPLY));
        assert!(kinds_seen.contains(&kinds::PEER_CONNECT));
        let pieces = kinds_seen
            .iter()
            .filter(|kind| **kind == kinds::PIECE_FINISHED)
            .count();
        assert_eq!(pieces, 8);

        assert!(session.query_pieces(handle).expect("pieces").iter().all(|bit| *bit));
        assert_eq!(
            fs::metadata(dir.path().join("payload.bin")).expect("file").len(),
            60
        );
        session.shutdown().expect("shutdown");
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn unresolved_magnet_waits_for_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = MetainfoBuilder::new("later.bin").file("later.bin", 16).build();
        let (mut session, mut rx) = started(SimulationConfig::fast());
        let mut info = parse_metainfo(&fixture.bytes).expect("metainfo");
        info.metadata = None;
        let handle = session
            .add_torrent(&AddParams {
                id: info.id.clone(),
                info,
                save_path: dir.path().to_path_buf(),
                priorities: Vec::new(),
                paused: false,
            })
            .expect("add");
        let first = rx.recv().await.expect("state alert");
        let payload: StatePayload = first.decode().expect("payload");
        assert_eq!(payload.state, TorrentStateCode::DownloadingMetadata);
        assert!(session.query_pieces(handle).expect("pieces").is_empty());

        session
            .swarm()
            .publish_metainfo(&fixture.bytes)
            .expect("publish");
        let alerts = collect_until(&mut rx, kinds::METADATA_RECEIVED).await;
        assert_eq!(alerts.last().map(|alert| alert.kind.as_str()), Some(kinds::METADATA_RECEIVED));
    }

    #[tokio::test]
    async fn remove_with_data_deletes_payload_and_rejects_stale_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = MetainfoBuilder::new("album")
            .file("one.flac", 10)
            .file("two.flac", 10)
            .build();
        let (mut session, _rx) = started(SimulationConfig::fast());
        let handle = session
            .add_torrent(&params(&fixture.bytes, dir.path()))
            .expect("add");
        assert!(dir.path().join("album/one.flac").exists());

        let outcome = session.remove_torrent(handle, true).expect("remove");
        assert!(outcome.data_error.is_none());
        assert!(!dir.path().join("album").exists());

        let err = session.remove_torrent(handle, true).expect_err("stale handle");
        assert!(matches!(
            err.downcast_ref::<NativeError>(),
            Some(NativeError::InvalidHandle { .. })
        ));
    }

    #[tokio::test]
    async fn unusable_save_path_fails_add() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").expect("write");
        let fixture = MetainfoBuilder::new("x.bin").file("x.bin", 4).build();
        let (mut session, _rx) = started(SimulationConfig::fast());
        let err = session
            .add_torrent(&params(&fixture.bytes, &blocker.join("nested")))
            .expect_err("save path under a file");
        assert!(matches!(
            err.downcast_ref::<NativeError>(),
            Some(NativeError::SaveDirectory { .. })
        ));
    }

    #[tokio::test]
    async fn stopped_session_rejects_work() {
        let fixture = MetainfoBuilder::new("x.bin").file("x.bin", 4).build();
        let mut session = SimulatedSession::new(SimulationConfig::fast(), SwarmDirectory::new());
        let err = session
            .add_torrent(&params(&fixture.bytes, Path::new("/tmp")))
            .expect_err("not started");
        assert!(matches!(
            err.downcast_ref::<NativeError>(),
            Some(NativeError::SessionStopped { .. })
        ));
    }

    #[tokio::test]
    async fn pause_disconnects_peers_and_reports_paused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fixture = MetainfoBuilder::new("big.bin")
            .piece_length(4)
            .file("big.bin", 4 * 400)
            .tracker("udp://tracker.test:80")
            .build();
        let (mut session, mut rx) = started(SimulationConfig::fast());
        let handle = session
            .add_torrent(&params(&fixture.bytes, dir.path()))
            .expect("add");
        let _ = collect_until(&mut rx, kinds::PEER_CONNECT).await;

        session.pause(handle).expect("pause");
        let alerts = collect_until(&mut rx, kinds::STATE_CHANGED).await;
        let last: StatePayload = alerts.last().expect("state").decode().expect("payload");
        assert_eq!(last.state, TorrentStateCode::Paused);
        assert!(alerts.iter().any(|alert| alert.kind == kinds::PEER_DISCONNECTED));
        session.pause(handle).expect("pause is idempotent");
        session.resume(handle).expect("resume");
    }
}
