//! `TorrentEngine`: the facade callers use to manage torrents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use swarmd_config::EngineConfig;
use swarmd_events::{DEFAULT_BUS_CAPACITY, Event, EventBus, EventStream, TorrentId, TorrentStateCode};
use swarmd_telemetry::Metrics;
use swarmd_torrent_core::{
    AddMode, AddTorrent, AddTorrentOptions, AdvancedState, BasicState, DataDeletionFailure,
    DeleteReport, FilePriority, PieceBitmap, Torrent, TorrentError, TorrentRepository,
    TorrentResult,
};
use swarmd_torrent_libt::{AddParams, NativeSession, NativeSessionAdapter, SourceInfo};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::provider::StateProvider;
use crate::registry::{TorrentRegistry, TorrentSnapshot};
use crate::waiters::{AddOutcome, AddWaiters};

const AGGREGATOR_DRAIN_LIMIT: Duration = Duration::from_secs(5);

/// Tunables for a [`TorrentEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Limit for [`AddMode::Sync`] adds.
    pub add_timeout: Duration,
    /// Window for coalescing status-only updates per torrent.
    pub status_coalesce: Duration,
    /// Event bus capacity.
    pub bus_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            add_timeout: Duration::from_secs(30),
            status_coalesce: Duration::from_millis(250),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            add_timeout: config.add_timeout(),
            status_coalesce: config.status_coalesce(),
            bus_capacity: config.event_bus_capacity,
        }
    }
}

/// Why a synchronous add did not produce a usable torrent.
#[derive(Debug, Error)]
pub enum AddFailure {
    /// The torrent failed before becoming usable.
    #[error("torrent failed before becoming usable")]
    Failed {
        /// Error reported by the session.
        message: String,
    },
    /// No usable snapshot arrived within the limit.
    #[error("torrent did not become usable in time")]
    TimedOut {
        /// Limit that elapsed.
        limit: Duration,
    },
    /// The engine stopped while the add was pending.
    #[error("engine stopped while the add was pending")]
    Interrupted,
}

/// Torrent session manager facade.
pub struct TorrentEngine {
    adapter: NativeSessionAdapter,
    registry: TorrentRegistry,
    bus: EventBus,
    repository: Arc<dyn TorrentRepository>,
    metrics: Metrics,
    waiters: AddWaiters,
    provider: StateProvider,
    options: EngineOptions,
    stopping: Arc<AtomicBool>,
    stop: watch::Sender<bool>,
    aggregator: Mutex<Option<JoinHandle<()>>>,
}

impl TorrentEngine {
    /// Start the native session and the aggregator on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Engine`] when the native session fails to start.
    pub fn start(
        runtime: &Handle,
        session: impl NativeSession + 'static,
        repository: Arc<dyn TorrentRepository>,
        metrics: Metrics,
        options: EngineOptions,
    ) -> TorrentResult<Self> {
        let adapter = NativeSessionAdapter::new(session);
        let alerts = adapter.start()?;
        let registry = TorrentRegistry::new();
        let bus = EventBus::with_capacity(options.bus_capacity);
        let waiters = AddWaiters::default();
        let stopping = Arc::new(AtomicBool::new(false));
        let (stop, stop_rx) = watch::channel(false);

        let aggregator = Aggregator::new(
            registry.clone(),
            bus.clone(),
            metrics.clone(),
            waiters.clone(),
            Arc::clone(&stopping),
            options.status_coalesce,
        )
        .spawn(alerts, runtime);
        let provider = StateProvider::new(
            registry.clone(),
            bus.clone(),
            runtime.clone(),
            metrics.clone(),
            stop_rx,
        );
        info!(
            add_timeout_ms = u64::try_from(options.add_timeout.as_millis()).unwrap_or(u64::MAX),
            "torrent engine started"
        );

        Ok(Self {
            adapter,
            registry,
            bus,
            repository,
            metrics,
            waiters,
            provider,
            options,
            stopping,
            stop,
            aggregator: Mutex::new(Some(aggregator)),
        })
    }

    /// Observation feeds over this engine's registry.
    #[must_use]
    pub fn state_provider(&self) -> StateProvider {
        self.provider.clone()
    }

    /// Live domain events. Nothing published before the call is replayed.
    #[must_use]
    pub fn events(&self) -> EventStream {
        self.bus.subscribe()
    }

    /// Whether the engine and its native session accept work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.stopping.load(Ordering::Acquire) && self.adapter.is_running()
    }

    /// Admit a torrent.
    ///
    /// In [`AddMode::Sync`] the call returns once metadata is known, or fails
    /// with [`TorrentError::Engine`] after the configured timeout; a failed
    /// sync add leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Validation`] for bad requests or duplicates,
    /// [`TorrentError::Engine`] for native failures and sync timeouts, and
    /// [`TorrentError::NotFound`] when the torrent is deleted before the add
    /// completes.
    pub async fn add_torrent(&self, request: AddTorrent, mode: AddMode) -> TorrentResult<TorrentId> {
        self.admit(request, mode, None, true).await
    }

    async fn admit(
        &self,
        request: AddTorrent,
        mode: AddMode,
        added_at: Option<DateTime<Utc>>,
        persist: bool,
    ) -> TorrentResult<TorrentId> {
        self.ensure_running("add_torrent")?;
        if request.save_path.as_os_str().is_empty() {
            return Err(TorrentError::validation("save_path", "must not be empty"));
        }
        let info = self.adapter.inspect_source(&request.source)?;
        check_request(&request, &info)?;

        let id = info.id.clone();
        let torrent = Torrent {
            id: id.clone(),
            name: request
                .options
                .name_hint
                .clone()
                .or_else(|| info.name.clone())
                .unwrap_or_else(|| id.to_string()),
            source: request.source,
            save_path: request.save_path,
            file_priorities: request.options.file_priorities,
            added_at: added_at.unwrap_or_else(Utc::now),
        };
        if !self
            .registry
            .insert(TorrentSnapshot::new(torrent.clone(), &info.trackers))
        {
            return Err(TorrentError::invalid_value(
                "source",
                "torrent already managed",
                id.as_str(),
            ));
        }
        self.metrics.set_active_torrents(self.registry.len());
        self.publish(Event::TorrentAdded {
            torrent_id: id.clone(),
            name: torrent.name.clone(),
        });

        let waiter = (mode == AddMode::Sync).then(|| self.waiters.register(&id));
        let started = Instant::now();
        let params = AddParams {
            id: id.clone(),
            info,
            save_path: torrent.save_path.clone(),
            priorities: torrent.file_priorities.clone(),
            paused: request.options.start_paused,
        };
        if let Err(err) = self.adapter.add(params).await {
            warn!(torrent_id = %id, error = %err, "native add failed; discarding torrent");
            self.waiters.cancel(&id);
            self.discard(&id, false).await;
            return Err(err);
        }
        // A concurrent delete may claim the entry while the native add runs.
        if !self.registry.contains(&id) {
            return Err(self.abandon(&id).await);
        }
        if persist {
            self.persist(&torrent).await;
            if !self.registry.contains(&id) {
                self.forget(&id).await;
                return Err(self.abandon(&id).await);
            }
        }
        info!(torrent_id = %id, name = %torrent.name, mode = ?mode, "torrent admitted");

        let Some(waiter) = waiter else {
            return Ok(id);
        };
        let failure = match tokio::time::timeout(self.options.add_timeout, waiter).await {
            Ok(Ok(AddOutcome::Usable)) => {
                self.metrics.observe_add_latency(started.elapsed());
                return Ok(id);
            }
            Ok(Ok(AddOutcome::Failed(message))) => AddFailure::Failed { message },
            Ok(Err(_)) => AddFailure::Interrupted,
            Err(_) => {
                self.waiters.cancel(&id);
                self.metrics.inc_add_timeout();
                AddFailure::TimedOut {
                    limit: self.options.add_timeout,
                }
            }
        };
        warn!(torrent_id = %id, reason = %failure, "synchronous add failed; discarding torrent");
        self.discard(&id, persist).await;
        Err(TorrentError::engine("add_torrent", Some(id), failure))
    }

    /// Remove torrents. Unknown ids are reported as skipped; data deletion
    /// failures are reported without undoing the removal.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::EngineNotRunning`] after shutdown.
    pub async fn delete_torrents(
        &self,
        ids: &[TorrentId],
        with_data: bool,
    ) -> TorrentResult<DeleteReport> {
        self.ensure_running("delete_torrents")?;
        let mut report = DeleteReport::default();
        for id in ids {
            if report.removed.contains(id) || report.skipped.contains(id) {
                continue;
            }
            if self.registry.remove(id).is_none() {
                debug!(torrent_id = %id, "delete skipped; torrent not managed");
                report.skipped.push(id.clone());
                continue;
            }
            self.waiters.cancel(id);

            let data_error = match self.adapter.remove(id, with_data).await {
                Ok(outcome) => outcome.and_then(|outcome| outcome.data_error),
                Err(err) => {
                    warn!(torrent_id = %id, error = %err, "native removal failed");
                    with_data.then(|| err.to_string())
                }
            };
            if let Some(message) = data_error {
                self.metrics.inc_data_deletion_failure();
                report.data_failures.push(DataDeletionFailure {
                    torrent_id: id.clone(),
                    message,
                });
            }
            self.forget(id).await;
            self.publish(Event::TorrentRemoved {
                torrent_id: id.clone(),
            });
            info!(torrent_id = %id, with_data, "torrent removed");
            report.removed.push(id.clone());
        }
        self.metrics.set_active_torrents(self.registry.len());
        Ok(report)
    }

    /// Pause torrents. Every id is checked before any is paused.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids,
    /// [`TorrentError::Validation`] for errored torrents, or an engine error.
    pub async fn pause_torrents(&self, ids: &[TorrentId]) -> TorrentResult<()> {
        self.ensure_running("pause_torrents")?;
        self.check_controllable(ids)?;
        for id in ids {
            self.adapter.pause(id).await?;
        }
        Ok(())
    }

    /// Resume paused torrents.
    ///
    /// # Errors
    ///
    /// See [`Self::pause_torrents`].
    pub async fn resume_torrents(&self, ids: &[TorrentId]) -> TorrentResult<()> {
        self.ensure_running("resume_torrents")?;
        self.check_controllable(ids)?;
        for id in ids {
            self.adapter.resume(id).await?;
        }
        Ok(())
    }

    /// Replace per-file priorities and persist them.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`], [`TorrentError::Validation`] when
    /// the list does not match the file count, or an engine error.
    pub async fn set_file_priorities(
        &self,
        id: &TorrentId,
        priorities: Vec<FilePriority>,
    ) -> TorrentResult<()> {
        self.ensure_running("set_file_priorities")?;
        let snapshot = self.require(id)?;
        if snapshot.metadata_known && priorities.len() != snapshot.files.len() {
            return Err(TorrentError::invalid_value(
                "file_priorities",
                "count does not match file list",
                priorities.len().to_string(),
            ));
        }
        self.adapter.set_priorities(id, &priorities).await?;

        let mut updated = None;
        self.registry.upsert(id, |snapshot| {
            snapshot.set_file_priorities(priorities);
            updated = Some(snapshot.torrent.clone());
        });
        if let Some(torrent) = updated {
            self.persist(&torrent).await;
        }
        Ok(())
    }

    /// Verified-piece bitmap. Falls back to the native session when the
    /// registry has not seen metadata yet.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids or an engine error.
    pub async fn get_pieces(&self, id: &TorrentId) -> TorrentResult<PieceBitmap> {
        let snapshot = self.require(id)?;
        if !snapshot.pieces.is_empty() {
            return Ok(snapshot.pieces);
        }
        let bits = PieceBitmap::from_bits(self.adapter.query_pieces(id).await?);
        if !bits.is_empty() {
            self.registry.upsert(id, |snapshot| {
                if snapshot.pieces.is_empty() {
                    snapshot.pieces = bits.clone();
                }
            });
        }
        Ok(bits)
    }

    /// Detailed state of one torrent.
    #[must_use]
    pub fn get(&self, id: &TorrentId) -> Option<AdvancedState> {
        self.registry.get(id).map(|snapshot| snapshot.advanced())
    }

    /// Basic state of every torrent, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<BasicState> {
        self.registry
            .get_all()
            .iter()
            .map(TorrentSnapshot::basic)
            .collect()
    }

    /// Re-admit torrents recorded in the repository. Individual failures are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::EngineNotRunning`] after shutdown.
    pub async fn restore(&self) -> TorrentResult<Vec<TorrentId>> {
        self.ensure_running("restore")?;
        let stored = match self.repository.load_all().await {
            Ok(stored) => stored,
            Err(err) => {
                self.metrics.inc_repository_failure();
                warn!(error = %err, "failed to load persisted torrents");
                return Ok(Vec::new());
            }
        };

        let mut restored = Vec::new();
        for torrent in stored {
            if self.registry.contains(&torrent.id) {
                continue;
            }
            let id = torrent.id.clone();
            let request = AddTorrent {
                source: torrent.source,
                save_path: torrent.save_path,
                expected_id: Some(torrent.id),
                options: AddTorrentOptions {
                    name_hint: Some(torrent.name),
                    file_priorities: torrent.file_priorities,
                    start_paused: false,
                },
            };
            match self
                .admit(request, AddMode::Async, Some(torrent.added_at), false)
                .await
            {
                Ok(id) => restored.push(id),
                Err(err) => warn!(torrent_id = %id, error = %err, "failed to restore torrent"),
            }
        }
        info!(count = restored.len(), "restored persisted torrents");
        Ok(restored)
    }

    /// Stop the native session, drain the aggregator and close every feed.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Engine`] if the native session fails to stop.
    pub async fn shutdown(&self) -> TorrentResult<()> {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let stopped = self.adapter.shutdown().await;
        self.waiters.cancel_all();

        let aggregator = self
            .aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = aggregator
            && tokio::time::timeout(AGGREGATOR_DRAIN_LIMIT, task).await.is_err()
        {
            warn!("aggregator did not drain before the shutdown limit");
        }
        self.stop.send_replace(true);
        info!("torrent engine stopped");
        stopped
    }

    fn ensure_running(&self, operation: &'static str) -> TorrentResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(TorrentError::EngineNotRunning { operation })
        }
    }

    fn require(&self, id: &TorrentId) -> TorrentResult<TorrentSnapshot> {
        self.registry.get(id).ok_or_else(|| TorrentError::NotFound {
            torrent_id: id.clone(),
        })
    }

    fn check_controllable(&self, ids: &[TorrentId]) -> TorrentResult<()> {
        for id in ids {
            if self.require(id)?.state == TorrentStateCode::Error {
                return Err(TorrentError::invalid_value(
                    "state",
                    "torrent is in error",
                    id.as_str(),
                ));
            }
        }
        Ok(())
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        self.bus.publish(event);
    }

    async fn persist(&self, torrent: &Torrent) {
        if let Err(err) = self.repository.save_torrent_metadata(torrent).await {
            self.metrics.inc_repository_failure();
            warn!(torrent_id = %torrent.id, error = %err, "failed to persist torrent metadata");
        }
    }

    async fn forget(&self, id: &TorrentId) {
        if let Err(err) = self.repository.delete_torrent_metadata(id).await {
            self.metrics.inc_repository_failure();
            warn!(torrent_id = %id, error = %err, "failed to delete torrent metadata");
        }
    }

    /// Undo an admission. The stored record is only deleted when this
    /// admission wrote it; restored torrents keep theirs.
    async fn discard(&self, id: &TorrentId, forget_record: bool) {
        if let Err(err) = self.adapter.remove(id, false).await {
            warn!(torrent_id = %id, error = %err, "failed to release native handle");
        }
        if self.registry.remove(id).is_some() {
            if forget_record {
                self.forget(id).await;
            }
            self.publish(Event::TorrentRemoved {
                torrent_id: id.clone(),
            });
        }
        self.metrics.set_active_torrents(self.registry.len());
    }

    /// Release a native handle whose registry entry was deleted mid-admission.
    async fn abandon(&self, id: &TorrentId) -> TorrentError {
        self.waiters.cancel(id);
        match self.adapter.remove(id, false).await {
            Ok(Some(_)) => debug!(torrent_id = %id, "released handle of torrent deleted during add"),
            Ok(None) => {}
            Err(err) => warn!(torrent_id = %id, error = %err, "failed to release native handle"),
        }
        TorrentError::NotFound {
            torrent_id: id.clone(),
        }
    }
}

fn check_request(request: &AddTorrent, info: &SourceInfo) -> TorrentResult<()> {
    if let Some(expected) = request.expected_id.as_ref()
        && expected != &info.id
    {
        return Err(TorrentError::invalid_value(
            "expected_id",
            "does not match source info hash",
            expected.as_str(),
        ));
    }
    let priorities = &request.options.file_priorities;
    if let Some(metadata) = info.metadata.as_ref()
        && !priorities.is_empty()
        && priorities.len() != metadata.files.len()
    {
        return Err(TorrentError::invalid_value(
            "file_priorities",
            "count does not match file list",
            priorities.len().to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmd_test_support::fixtures::MetainfoBuilder;
    use swarmd_torrent_core::TorrentSource;
    use swarmd_torrent_libt::{SimulatedSession, SimulationConfig, SwarmDirectory};

    use crate::repository::MemoryTorrentRepository;

    fn engine(options: EngineOptions) -> (TorrentEngine, Arc<MemoryTorrentRepository>) {
        let repository = Arc::new(MemoryTorrentRepository::new());
        let engine = TorrentEngine::start(
            &Handle::current(),
            SimulatedSession::new(SimulationConfig::fast(), SwarmDirectory::new()),
            repository.clone(),
            Metrics::new().expect("metrics"),
            options,
        )
        .expect("engine starts");
        (engine, repository)
    }

    #[tokio::test]
    async fn requests_are_validated_before_admission() -> anyhow::Result<()> {
        let (engine, repository) = engine(EngineOptions::default());
        let dir = tempfile::tempdir()?;
        let fixture = MetainfoBuilder::new("demo")
            .file("a.bin", 16)
            .file("b.bin", 16)
            .build();

        let err = engine
            .add_torrent(
                AddTorrent::new(TorrentSource::metainfo(fixture.bytes.clone()), ""),
                AddMode::Async,
            )
            .await
            .expect_err("empty save path");
        assert!(matches!(err, TorrentError::Validation { field: "save_path", .. }));

        let mut request = AddTorrent::new(TorrentSource::metainfo(fixture.bytes.clone()), dir.path());
        request.expected_id = Some(TorrentId::from_info_hash(&[0; 20]));
        let err = engine.add_torrent(request, AddMode::Async).await.expect_err("mismatch");
        assert!(matches!(err, TorrentError::Validation { field: "expected_id", .. }));

        let mut request = AddTorrent::new(TorrentSource::metainfo(fixture.bytes.clone()), dir.path());
        request.options.file_priorities = vec![FilePriority::High];
        let err = engine.add_torrent(request, AddMode::Async).await.expect_err("priorities");
        assert!(matches!(err, TorrentError::Validation { field: "file_priorities", .. }));

        let request = AddTorrent::new(TorrentSource::metainfo(fixture.bytes.clone()), dir.path());
        let id = engine.add_torrent(request.clone(), AddMode::Async).await?;
        assert_eq!(id.as_str(), fixture.info_hash_hex);
        let err = engine.add_torrent(request, AddMode::Async).await.expect_err("duplicate");
        assert!(matches!(err, TorrentError::Validation { field: "source", .. }));

        assert_eq!(repository.load(&id).await?.map(|torrent| torrent.name), Some("demo".to_string()));
        assert_eq!(engine.list().len(), 1);
        engine.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn unknown_ids_are_rejected_or_skipped() -> anyhow::Result<()> {
        let (engine, _) = engine(EngineOptions::default());
        let ghost = TorrentId::from_info_hash(&[7; 20]);
        assert!(matches!(
            engine.pause_torrents(std::slice::from_ref(&ghost)).await,
            Err(TorrentError::NotFound { .. })
        ));
        assert!(matches!(
            engine.get_pieces(&ghost).await,
            Err(TorrentError::NotFound { .. })
        ));
        let report = engine.delete_torrents(&[ghost.clone(), ghost.clone()], true).await?;
        assert_eq!(report.skipped, vec![ghost]);
        assert!(report.removed.is_empty());
        engine.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn operations_after_shutdown_report_not_running() -> anyhow::Result<()> {
        let (engine, _) = engine(EngineOptions::default());
        engine.shutdown().await?;
        engine.shutdown().await?;
        assert!(!engine.is_running());
        let err = engine
            .add_torrent(
                AddTorrent::new(TorrentSource::magnet("magnet:?xt=urn:btih:00"), "/tmp"),
                AddMode::Async,
            )
            .await
            .expect_err("stopped");
        assert!(matches!(err, TorrentError::EngineNotRunning { .. }));
        Ok(())
    }

    #[test]
    fn options_follow_configuration() {
        let config = EngineConfig {
            add_timeout_ms: 1_500,
            status_coalesce_ms: 0,
            event_bus_capacity: 8,
            ..EngineConfig::default()
        };
        let options = EngineOptions::from(&config);
        assert_eq!(options.add_timeout, Duration::from_millis(1_500));
        assert_eq!(options.status_coalesce, Duration::ZERO);
        assert_eq!(options.bus_capacity, 8);
    }
}
