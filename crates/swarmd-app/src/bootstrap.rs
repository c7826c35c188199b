use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use swarmd_config::{EngineConfig, SimulationSettings};
use swarmd_engine::{EngineOptions, JsonTorrentStore, Subscription, TorrentEngine};
use swarmd_telemetry::{LogFormat, LoggingConfig, Metrics};
use swarmd_torrent_core::{SessionState, TorrentRepository};
use swarmd_torrent_libt::{SimulatedSession, SimulationConfig, SwarmDirectory};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

const REPORTER_DRAIN_LIMIT: Duration = Duration::from_secs(1);

/// Dependencies required to run one engine.
pub(crate) struct BootstrapDependencies {
    config: EngineConfig,
    metrics: Metrics,
    repository: Arc<dyn TorrentRepository>,
    session: SimulatedSession,
}

impl BootstrapDependencies {
    /// Construct production dependencies from an already validated configuration.
    pub(crate) fn from_config(config: EngineConfig) -> AppResult<Self> {
        std::fs::create_dir_all(&config.download_root).map_err(|source| AppError::Io {
            operation: "download_root.create",
            path: Some(config.download_root.clone()),
            source,
        })?;
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let repository = JsonTorrentStore::new(&config.metadata_dir)
            .map_err(|err| AppError::repository("metadata_store.open", err))?;
        let session = SimulatedSession::new(
            simulation_config(&config.simulation),
            SwarmDirectory::new(),
        );

        Ok(Self {
            config,
            metrics,
            repository: Arc::new(repository),
            session,
        })
    }
}

/// Entry point for the swarmd boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging or engine startup fails.
pub async fn run_app() -> AppResult<()> {
    let config = swarmd_config::load().map_err(|err| AppError::config("config.load", err))?;
    let logging = LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_name(config.logging.format.as_deref()),
        build_sha: option_env!("SWARMD_BUILD_SHA").unwrap_or("dev"),
    };
    swarmd_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    let dependencies = BootstrapDependencies::from_config(config)?;
    run_app_with(dependencies, shutdown_signal()).await
}

/// Boot sequence that relies entirely on injected dependencies to simplify testing.
pub(crate) async fn run_app_with(
    dependencies: BootstrapDependencies,
    shutdown: impl Future<Output = ()>,
) -> AppResult<()> {
    let BootstrapDependencies {
        config,
        metrics,
        repository,
        session,
    } = dependencies;
    info!(
        download_root = %config.download_root.display(),
        metadata_dir = %config.metadata_dir.display(),
        build_sha = swarmd_telemetry::build_sha(),
        "swarmd bootstrap starting"
    );

    let engine = TorrentEngine::start(
        &Handle::current(),
        session,
        repository,
        metrics.clone(),
        EngineOptions::from(&config),
    )
    .map_err(|err| AppError::torrent("engine.start", err))?;
    let restored = engine
        .restore()
        .await
        .map_err(|err| AppError::torrent("engine.restore", err))?;
    info!(restored = restored.len(), "torrent engine ready");

    let reporter = spawn_session_reporter(engine.state_provider().observe_session());
    shutdown.await;
    info!("shutdown requested");

    let stopped = engine.shutdown().await;
    if tokio::time::timeout(REPORTER_DRAIN_LIMIT, reporter)
        .await
        .is_err()
    {
        warn!("session reporter did not stop in time");
    }
    match metrics.render() {
        Ok(exposition) => debug!(metrics = %exposition, "final metrics"),
        Err(err) => warn!(error = %err, "failed to render final metrics"),
    }
    stopped.map_err(|err| AppError::torrent("engine.shutdown", err))?;
    info!("swarmd shutdown complete");
    Ok(())
}

const fn simulation_config(settings: &SimulationSettings) -> SimulationConfig {
    SimulationConfig {
        tick_interval: settings.tick_interval(),
        pieces_per_tick: settings.pieces_per_tick,
        peers_per_torrent: settings.peers_per_torrent,
        seed_after_finish: settings.seed_after_finish,
        stats_every_ticks: settings.stats_every_ticks,
        rng_seed: settings.rng_seed,
    }
}

fn spawn_session_reporter(mut feed: Subscription<SessionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(state) = feed.next().await {
            debug!(
                torrents = state.torrents,
                downloading = state.downloading,
                completed = state.completed,
                download_bps = state.download_bps,
                upload_bps = state.upload_bps,
                "session state"
            );
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c; shutting down");
    }
}
