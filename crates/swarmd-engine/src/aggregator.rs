//! Drains native alerts, folds them into the registry and publishes domain events.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use swarmd_events::{Event, EventBus, TorrentId, TorrentStateCode};
use swarmd_telemetry::Metrics;
use swarmd_torrent_libt::alert::{
    ErrorPayload, MetadataPayload, PeerGonePayload, PeerPayload, PiecePayload, StatePayload,
    TrackerPayload, kinds,
};
use swarmd_torrent_libt::{AlertReceiver, NativeAlert};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::{Applied, TorrentRegistry};
use crate::waiters::{AddOutcome, AddWaiters};

const SESSION_COMPONENT: &str = "session";

/// Result of classifying one native alert.
#[derive(Debug)]
enum Classified {
    Torrent { event: Event, status_only: bool },
    SessionFailed(String),
    SessionRecovered,
    Ignored,
    Malformed(&'static str),
}

pub(crate) struct Aggregator {
    registry: TorrentRegistry,
    bus: EventBus,
    metrics: Metrics,
    waiters: AddWaiters,
    stopping: Arc<AtomicBool>,
    coalesce: Duration,
    status_last_emit: HashMap<TorrentId, Instant>,
    health: BTreeSet<String>,
}

impl Aggregator {
    pub(crate) fn new(
        registry: TorrentRegistry,
        bus: EventBus,
        metrics: Metrics,
        waiters: AddWaiters,
        stopping: Arc<AtomicBool>,
        coalesce: Duration,
    ) -> Self {
        Self {
            registry,
            bus,
            metrics,
            waiters,
            stopping,
            coalesce,
            status_last_emit: HashMap::new(),
            health: BTreeSet::new(),
        }
    }

    /// Run the aggregator as the single consumer of `alerts`.
    pub(crate) fn spawn(mut self, mut alerts: AlertReceiver, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(async move {
            while let Some(alert) = alerts.recv().await {
                self.handle_alert(&alert);
            }
            if self.stopping.load(Ordering::Acquire) {
                debug!("alert stream closed during shutdown");
            } else {
                self.mark_degraded(SESSION_COMPONENT, Some("alert stream closed unexpectedly"));
            }
            self.waiters.cancel_all();
        })
    }

    fn handle_alert(&mut self, alert: &NativeAlert) {
        self.metrics.inc_alert(&alert.kind);
        match classify(alert) {
            Classified::Torrent { event, status_only } => self.dispatch(event, status_only),
            Classified::SessionFailed(message) => {
                self.mark_degraded(SESSION_COMPONENT, Some(&message));
            }
            Classified::SessionRecovered => self.mark_recovered(SESSION_COMPONENT),
            Classified::Ignored => {
                debug!(kind = %alert.kind, "dropping irrelevant native alert");
            }
            Classified::Malformed(reason) => {
                warn!(
                    kind = %alert.kind,
                    info_hash = alert.info_hash.as_deref().unwrap_or_default(),
                    reason,
                    "dropping malformed native alert"
                );
            }
        }
    }

    fn dispatch(&mut self, event: Event, status_only: bool) {
        let Some(id) = event.torrent_id().cloned() else {
            return;
        };
        match self.registry.apply(&event) {
            Applied::Unknown => {
                if matches!(event, Event::TorrentRemoved { .. }) {
                    debug!(torrent_id = %id, "removal confirmed for released torrent");
                } else {
                    warn!(
                        torrent_id = %id,
                        event = event.kind(),
                        "event for unknown torrent dropped"
                    );
                }
                self.status_last_emit.remove(&id);
                return;
            }
            // Announces and peer churn are observable even when they repeat
            // what the registry already holds.
            Applied::Unchanged if always_published(&event) => self.publish(event),
            Applied::Unchanged => {
                debug!(torrent_id = %id, event = event.kind(), "event carried no change");
            }
            Applied::Changed => {
                if status_only && !self.should_emit_status(&id) {
                    debug!(torrent_id = %id, "coalescing status update");
                } else {
                    self.publish(event);
                }
            }
        }
        self.notify_waiter(&id);
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        self.bus.publish(event);
    }

    fn notify_waiter(&self, id: &TorrentId) {
        if !self.waiters.is_waiting(id) {
            return;
        }
        let Some(snapshot) = self.registry.get(id) else {
            return;
        };
        if snapshot.state == TorrentStateCode::Error {
            let message = snapshot
                .error
                .unwrap_or_else(|| "torrent entered error state".to_string());
            self.waiters.resolve(id, AddOutcome::Failed(message));
        } else if snapshot.metadata_known {
            self.waiters.resolve(id, AddOutcome::Usable);
        }
    }

    fn should_emit_status(&mut self, id: &TorrentId) -> bool {
        let now = Instant::now();
        match self.status_last_emit.get_mut(id) {
            Some(last) if now.duration_since(*last) < self.coalesce => false,
            Some(last) => {
                *last = now;
                true
            }
            None => {
                self.status_last_emit.insert(id.clone(), now);
                true
            }
        }
    }

    fn mark_degraded(&mut self, component: &str, detail: Option<&str>) {
        if self.health.insert(component.to_string()) {
            self.publish_health();
            warn!(
                component,
                detail = detail.unwrap_or_default(),
                "engine component degraded"
            );
        } else if let Some(detail) = detail {
            warn!(component, detail, "engine component still degraded");
        }
    }

    fn mark_recovered(&mut self, component: &str) {
        if self.health.remove(component) {
            self.publish_health();
            info!(component, "engine component recovered");
        }
    }

    fn publish_health(&self) {
        self.publish(Event::HealthChanged {
            degraded: self.health.iter().cloned().collect(),
        });
    }
}

fn classify(alert: &NativeAlert) -> Classified {
    match alert.kind.as_str() {
        kinds::SESSION_ERROR => {
            return match alert.decode::<ErrorPayload>() {
                Ok(payload) => Classified::SessionFailed(payload.message),
                Err(_) => Classified::Malformed("session error payload"),
            };
        }
        kinds::SESSION_RECOVERED => return Classified::SessionRecovered,
        kinds::STATE_CHANGED
        | kinds::STATE_UPDATE
        | kinds::METADATA_RECEIVED
        | kinds::PIECE_FINISHED
        | kinds::TRACKER_REPLY
        | kinds::TRACKER_ERROR
        | kinds::PEER_CONNECT
        | kinds::PEER_DISCONNECTED
        | kinds::FILE_ERROR
        | kinds::TORRENT_ERROR
        | kinds::TORRENT_FINISHED
        | kinds::TORRENT_REMOVED => {}
        _ => return Classified::Ignored,
    }

    let Some(torrent_id) = alert
        .info_hash
        .as_deref()
        .and_then(|hash| TorrentId::parse(hash).ok())
    else {
        return Classified::Malformed("missing or invalid info hash");
    };

    let event = match alert.kind.as_str() {
        kinds::STATE_CHANGED | kinds::STATE_UPDATE => {
            decode(alert, "state payload", |StatePayload { state, stats }| {
                Event::StateChanged {
                    torrent_id,
                    state,
                    stats,
                }
            })
        }
        kinds::METADATA_RECEIVED => decode(alert, "metadata payload", |payload: MetadataPayload| {
            Event::MetadataReceived {
                torrent_id,
                name: payload.name,
                piece_length: payload.piece_length,
                piece_count: payload.piece_count,
                total_bytes: payload.total_bytes,
                files: payload.files,
            }
        }),
        kinds::PIECE_FINISHED => decode(alert, "piece payload", |PiecePayload { piece_index }| {
            Event::PieceFinished {
                torrent_id,
                piece_index,
            }
        }),
        kinds::TRACKER_REPLY | kinds::TRACKER_ERROR => {
            decode(alert, "tracker payload", |payload: TrackerPayload| {
                Event::TrackerReply {
                    torrent_id,
                    tracker_url: payload.url,
                    status: payload.status,
                    detail: payload.detail,
                }
            })
        }
        kinds::PEER_CONNECT => decode(alert, "peer payload", |PeerPayload { peer }| {
            Event::PeerConnected { torrent_id, peer }
        }),
        kinds::PEER_DISCONNECTED => {
            decode(alert, "peer payload", |payload: PeerGonePayload| {
                Event::PeerDisconnected {
                    torrent_id,
                    peer: payload.endpoint,
                }
            })
        }
        kinds::FILE_ERROR | kinds::TORRENT_ERROR => {
            decode(alert, "error payload", |ErrorPayload { message }| {
                Event::TorrentError {
                    torrent_id,
                    message,
                }
            })
        }
        kinds::TORRENT_FINISHED => Ok(Event::TorrentFinished { torrent_id }),
        _ => Ok(Event::TorrentRemoved { torrent_id }),
    };

    match event {
        Ok(event) => Classified::Torrent {
            event,
            status_only: alert.kind == kinds::STATE_UPDATE,
        },
        Err(reason) => Classified::Malformed(reason),
    }
}

fn decode<T, F>(alert: &NativeAlert, what: &'static str, build: F) -> Result<Event, &'static str>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Event,
{
    alert.decode::<T>().map(build).map_err(|_| what)
}

const fn always_published(event: &Event) -> bool {
    matches!(
        event,
        Event::TrackerReply { .. } | Event::PeerConnected { .. } | Event::PeerDisconnected { .. }
    )
}
