//! Safe, typed wrapper around a native session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use swarmd_events::TorrentId;
use swarmd_torrent_core::{FilePriority, TorrentError, TorrentResult, TorrentSource};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::alert::AlertReceiver;
use crate::command::{self, Reply, SessionCommand};
use crate::error::{NativeError, op_failed};
use crate::metainfo::{SourceInfo, parse_magnet, parse_metainfo};
use crate::session::NativeSession;
use crate::types::{AddParams, NativeHandle, RemovalOutcome};

/// Adapter that owns the native session and the id → handle mapping.
///
/// Once started, the session lives on its own thread and every native call
/// is a command with a `oneshot` reply, so callers never block an async
/// worker. Every native failure is surfaced as a [`TorrentError`];
/// session-level `anyhow` errors are downcast to [`NativeError`] where possible.
#[derive(Clone)]
pub struct NativeSessionAdapter {
    pending: Arc<Mutex<Option<Box<dyn NativeSession>>>>,
    commands: Arc<OnceLock<mpsc::UnboundedSender<SessionCommand>>>,
    running: Arc<AtomicBool>,
    handles: Arc<Mutex<HashMap<TorrentId, NativeHandle>>>,
}

impl NativeSessionAdapter {
    /// Wrap a native session. The session is not started yet.
    #[must_use]
    pub fn new(session: impl NativeSession + 'static) -> Self {
        Self {
            pending: Arc::new(Mutex::new(Some(Box::new(session)))),
            commands: Arc::new(OnceLock::new()),
            running: Arc::new(AtomicBool::new(false)),
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<TorrentId, NativeHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the native session, hand it to the command thread and return
    /// the single alert stream.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Engine`] if the session fails to start or was
    /// already started.
    pub fn start(&self) -> TorrentResult<AlertReceiver> {
        let Some(mut session) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Err(op_failed(
                "start",
                None,
                NativeError::NativeFailure {
                    operation: "start",
                    message: "session already started".into(),
                },
            ));
        };
        let (sink, alerts) = mpsc::unbounded_channel();
        session
            .start(sink)
            .map_err(|err| map_session_error("start", None, err))?;

        let (commands, requests) = mpsc::unbounded_channel();
        command::spawn(session, requests).map_err(|err| {
            op_failed(
                "start",
                None,
                NativeError::NativeFailure {
                    operation: "start",
                    message: err.to_string(),
                },
            )
        })?;
        if self.commands.set(commands).is_err() {
            warn!("native command channel was already installed");
        }
        self.running.store(true, Ordering::Release);
        info!("native session started");
        Ok(alerts)
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        torrent_id: Option<&TorrentId>,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> TorrentResult<T> {
        let stopped = || TorrentError::EngineNotRunning { operation };
        let sender = self.commands.get().ok_or_else(stopped)?;
        let (respond_to, reply) = oneshot::channel();
        sender.send(build(respond_to)).map_err(|_| stopped())?;
        reply
            .await
            .map_err(|_| stopped())?
            .map_err(|err| map_session_error(operation, torrent_id, err))
    }

    /// Derive identity, trackers and layout from a torrent source.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Validation`] when the source cannot be interpreted.
    pub fn inspect_source(&self, source: &TorrentSource) -> TorrentResult<SourceInfo> {
        let parsed = match source {
            TorrentSource::Magnet { uri } => parse_magnet(uri),
            TorrentSource::Metainfo { bytes } => parse_metainfo(bytes),
            TorrentSource::File { path } => std::fs::read(path)
                .map_err(|source| NativeError::SourceIo {
                    path: path.clone(),
                    source,
                })
                .and_then(|bytes| parse_metainfo(&bytes)),
        };
        parsed.map_err(|err| source_rejected(&err))
    }

    /// Admit a torrent and remember its handle.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Engine`] on native failure (I/O on the save path,
    /// malformed metadata) and [`TorrentError::EngineNotRunning`] after shutdown.
    pub async fn add(&self, params: AddParams) -> TorrentResult<NativeHandle> {
        let id = params.id.clone();
        let handle = self
            .call("add_torrent", Some(&id), |respond_to| SessionCommand::Add {
                params: Box::new(params),
                respond_to,
            })
            .await?;
        self.handles().insert(id.clone(), handle);
        debug!(torrent_id = %id, %handle, "adapter registered native handle");
        Ok(handle)
    }

    /// Remove a torrent. Returns `None` when the adapter holds no handle for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Engine`] when the native session rejects the removal.
    pub async fn remove(
        &self,
        id: &TorrentId,
        with_data: bool,
    ) -> TorrentResult<Option<RemovalOutcome>> {
        let Some(handle) = self.handles().remove(id) else {
            return Ok(None);
        };
        let outcome = self
            .call("remove_torrent", Some(id), |respond_to| SessionCommand::Remove {
                handle,
                with_data,
                respond_to,
            })
            .await?;
        if let Some(message) = outcome.data_error.as_deref() {
            warn!(torrent_id = %id, error = %message, "payload deletion incomplete");
        }
        Ok(Some(outcome))
    }

    /// Pause a torrent.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids or an engine error.
    pub async fn pause(&self, id: &TorrentId) -> TorrentResult<()> {
        let handle = self.require_handle(id)?;
        self.call("pause", Some(id), |respond_to| SessionCommand::Pause {
            handle,
            respond_to,
        })
        .await
    }

    /// Resume a torrent.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids or an engine error.
    pub async fn resume(&self, id: &TorrentId) -> TorrentResult<()> {
        let handle = self.require_handle(id)?;
        self.call("resume", Some(id), |respond_to| SessionCommand::Resume {
            handle,
            respond_to,
        })
        .await
    }

    /// Replace per-file priorities.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids or an engine error.
    pub async fn set_priorities(
        &self,
        id: &TorrentId,
        priorities: &[FilePriority],
    ) -> TorrentResult<()> {
        let handle = self.require_handle(id)?;
        let priorities = priorities.to_vec();
        self.call("set_priorities", Some(id), |respond_to| {
            SessionCommand::SetPriorities {
                handle,
                priorities,
                respond_to,
            }
        })
        .await
    }

    /// Read the verified-piece bitmap straight from the native session.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown ids or an engine error.
    pub async fn query_pieces(&self, id: &TorrentId) -> TorrentResult<Vec<bool>> {
        let handle = self.require_handle(id)?;
        self.call("query_pieces", Some(id), |respond_to| {
            SessionCommand::QueryPieces { handle, respond_to }
        })
        .await
    }

    /// Whether the native session accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Handle for a torrent, if the adapter knows it.
    #[must_use]
    pub fn handle(&self, id: &TorrentId) -> Option<NativeHandle> {
        self.handles().get(id).copied()
    }

    /// Stop the native session and its command thread. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::Engine`] if the session fails to stop cleanly.
    pub async fn shutdown(&self) -> TorrentResult<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let stopped = self
            .call("shutdown", None, |respond_to| SessionCommand::Shutdown {
                respond_to,
            })
            .await;
        self.handles().clear();
        stopped?;
        info!("native session stopped");
        Ok(())
    }

    fn require_handle(&self, id: &TorrentId) -> TorrentResult<NativeHandle> {
        self.handle(id).ok_or_else(|| TorrentError::NotFound {
            torrent_id: id.clone(),
        })
    }
}

fn map_session_error(
    operation: &'static str,
    torrent_id: Option<&TorrentId>,
    err: anyhow::Error,
) -> TorrentError {
    match NativeError::from_session(operation, err) {
        NativeError::SessionStopped { operation } => TorrentError::EngineNotRunning { operation },
        native => op_failed(operation, torrent_id.cloned(), native),
    }
}

fn source_rejected(err: &NativeError) -> TorrentError {
    match err {
        NativeError::MalformedMetadata { reason } | NativeError::InvalidMagnet { reason } => {
            TorrentError::validation("source", *reason)
        }
        NativeError::SourceIo { path, .. } => TorrentError::invalid_value(
            "source",
            "torrent file unreadable",
            path.display().to_string(),
        ),
        _ => TorrentError::validation("source", "source could not be interpreted"),
    }
}
