//! Observation feeds over the registry.
//!
//! Every subscription subscribes to the event bus first, then reads the
//! registry, so no change between the two is lost. Feeds run on the runtime
//! handle the provider was built with and hand values to subscribers through
//! latest-value channels: a slow subscriber only ever sees the newest
//! snapshot.

use swarmd_events::{Event, EventBus, EventEnvelope, TorrentId};
use swarmd_telemetry::Metrics;
use swarmd_torrent_core::{AdvancedState, BasicState, PeerState, PieceBitmap, SessionState, TrackerState};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::registry::TorrentRegistry;

/// Why a subscription stopped producing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionClosed {
    /// The observed torrent was removed.
    TorrentRemoved,
    /// The engine shut down.
    ProviderShutdown,
}

#[derive(Debug, Clone)]
enum FeedItem<T> {
    Pending,
    Value(T),
    Closed(SubscriptionClosed),
}

/// Stream of snapshots for one observation. Dropping it cancels the feed.
pub struct Subscription<T> {
    updates: watch::Receiver<FeedItem<T>>,
    closed: Option<SubscriptionClosed>,
    task: JoinHandle<()>,
    metrics: Metrics,
}

impl<T: Clone> Subscription<T> {
    /// Wait for the next snapshot. Returns `None` once the feed has ended;
    /// [`Self::closed_reason`] then says why.
    pub async fn next(&mut self) -> Option<T> {
        while self.closed.is_none() {
            if self.updates.changed().await.is_err() {
                self.closed = Some(SubscriptionClosed::ProviderShutdown);
                break;
            }
            let item = self.updates.borrow_and_update().clone();
            match item {
                FeedItem::Value(value) => return Some(value),
                FeedItem::Closed(reason) => self.closed = Some(reason),
                FeedItem::Pending => {}
            }
        }
        None
    }

    /// Most recent snapshot delivered by the feed, without waiting.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        match &*self.updates.borrow() {
            FeedItem::Value(value) => Some(value.clone()),
            FeedItem::Pending | FeedItem::Closed(_) => None,
        }
    }

    /// Reason the feed ended, once [`Self::next`] has returned `None`.
    #[must_use]
    pub const fn closed_reason(&self) -> Option<SubscriptionClosed> {
        self.closed
    }

    /// Stop the feed.
    pub fn cancel(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
        self.metrics.subscription_closed();
    }
}

/// Factory for observation feeds.
#[derive(Clone)]
pub struct StateProvider {
    registry: TorrentRegistry,
    bus: EventBus,
    runtime: Handle,
    metrics: Metrics,
    stop: watch::Receiver<bool>,
}

impl StateProvider {
    pub(crate) const fn new(
        registry: TorrentRegistry,
        bus: EventBus,
        runtime: Handle,
        metrics: Metrics,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            bus,
            runtime,
            metrics,
            stop,
        }
    }

    /// Basic status; identical consecutive snapshots are suppressed.
    #[must_use]
    pub fn observe_state(&self, id: &TorrentId) -> Subscription<BasicState> {
        let key = id.clone();
        self.subscribe(Some(id.clone()), true, affects_basic, move |registry| {
            registry.get(&key).map(|snapshot| snapshot.basic())
        })
    }

    /// Detailed status; emitted for every event touching the torrent.
    #[must_use]
    pub fn observe_advanced_state(&self, id: &TorrentId) -> Subscription<AdvancedState> {
        let key = id.clone();
        self.subscribe(Some(id.clone()), false, |_| true, move |registry| {
            registry.get(&key).map(|snapshot| snapshot.advanced())
        })
    }

    /// Full ordered tracker list, re-sent on every tracker reply.
    #[must_use]
    pub fn observe_trackers_state(&self, id: &TorrentId) -> Subscription<Vec<TrackerState>> {
        let key = id.clone();
        self.subscribe(
            Some(id.clone()),
            false,
            |event| matches!(event, Event::TrackerReply { .. }),
            move |registry| registry.get(&key).map(|snapshot| snapshot.trackers),
        )
    }

    /// Full peer list, re-sent on every connect and disconnect.
    #[must_use]
    pub fn observe_peers_state(&self, id: &TorrentId) -> Subscription<Vec<PeerState>> {
        let key = id.clone();
        self.subscribe(
            Some(id.clone()),
            false,
            |event| {
                matches!(
                    event,
                    Event::PeerConnected { .. } | Event::PeerDisconnected { .. }
                )
            },
            move |registry| registry.get(&key).map(|snapshot| snapshot.peers),
        )
    }

    /// Piece bitmap; the first value is the whole bitmap once metadata is known.
    #[must_use]
    pub fn observe_pieces_state(&self, id: &TorrentId) -> Subscription<PieceBitmap> {
        let key = id.clone();
        self.subscribe(
            Some(id.clone()),
            false,
            |event| {
                matches!(
                    event,
                    Event::PieceFinished { .. } | Event::MetadataReceived { .. }
                )
            },
            move |registry| {
                registry
                    .get(&key)
                    .filter(|snapshot| snapshot.metadata_known)
                    .map(|snapshot| snapshot.pieces)
            },
        )
    }

    /// Basic status of every torrent, oldest first.
    #[must_use]
    pub fn observe_torrents(&self) -> Subscription<Vec<BasicState>> {
        self.subscribe(None, true, |_| true, |registry| {
            Some(
                registry
                    .get_all()
                    .iter()
                    .map(crate::registry::TorrentSnapshot::basic)
                    .collect(),
            )
        })
    }

    /// Session-wide totals.
    #[must_use]
    pub fn observe_session(&self) -> Subscription<SessionState> {
        self.subscribe(None, true, |_| true, |registry| Some(registry.session_state()))
    }

    fn subscribe<T, P>(
        &self,
        scope: Option<TorrentId>,
        dedup: bool,
        triggers: fn(&Event) -> bool,
        project: P,
    ) -> Subscription<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        P: Fn(&TorrentRegistry) -> Option<T> + Send + 'static,
    {
        let events = self.bus.receiver();
        let (sender, updates) = watch::channel(FeedItem::Pending);
        let feed = Feed {
            registry: self.registry.clone(),
            scope,
            triggers,
            project,
            dedup,
            sender,
            last: None,
        };
        let task = self.runtime.spawn(feed.run(events, self.stop.clone()));
        self.metrics.subscription_opened();
        Subscription {
            updates,
            closed: None,
            task,
            metrics: self.metrics.clone(),
        }
    }
}

fn affects_basic(event: &Event) -> bool {
    matches!(
        event,
        Event::TorrentAdded { .. }
            | Event::MetadataReceived { .. }
            | Event::StateChanged { .. }
            | Event::PeerConnected { .. }
            | Event::PeerDisconnected { .. }
            | Event::TorrentError { .. }
            | Event::TorrentFinished { .. }
    )
}

struct Feed<T, P> {
    registry: TorrentRegistry,
    scope: Option<TorrentId>,
    triggers: fn(&Event) -> bool,
    project: P,
    dedup: bool,
    sender: watch::Sender<FeedItem<T>>,
    last: Option<T>,
}

impl<T, P> Feed<T, P>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    P: Fn(&TorrentRegistry) -> Option<T> + Send + 'static,
{
    async fn run(
        mut self,
        mut events: broadcast::Receiver<EventEnvelope>,
        mut stop: watch::Receiver<bool>,
    ) {
        if *stop.borrow_and_update() {
            self.close(SubscriptionClosed::ProviderShutdown);
            return;
        }
        if !self.refresh() {
            return;
        }
        loop {
            let keep_going = tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_ok() && !*stop.borrow() {
                        true
                    } else {
                        self.close(SubscriptionClosed::ProviderShutdown);
                        false
                    }
                }
                received = events.recv() => match received {
                    Ok(envelope) => self.handle(&envelope.event),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "observer lagged; resynchronising from registry");
                        self.refresh()
                    }
                    Err(RecvError::Closed) => {
                        self.close(SubscriptionClosed::ProviderShutdown);
                        false
                    }
                }
            };
            if !keep_going {
                return;
            }
        }
    }

    fn handle(&mut self, event: &Event) -> bool {
        let Some(torrent_id) = event.torrent_id() else {
            return true;
        };
        match &self.scope {
            Some(scope) if scope != torrent_id => true,
            Some(_) if matches!(event, Event::TorrentRemoved { .. }) => {
                self.close(SubscriptionClosed::TorrentRemoved);
                false
            }
            Some(_) if self.last.is_none() || (self.triggers)(event) => self.refresh(),
            Some(_) => true,
            None if (self.triggers)(event) => self.refresh(),
            None => true,
        }
    }

    fn refresh(&mut self) -> bool {
        match (self.project)(&self.registry) {
            Some(value) => {
                if self.dedup && self.last.as_ref() == Some(&value) {
                    return true;
                }
                self.last = Some(value.clone());
                self.sender.send(FeedItem::Value(value)).is_ok()
            }
            None if self.last.is_some() && self.scope.is_some() => {
                self.close(SubscriptionClosed::TorrentRemoved);
                false
            }
            None => true,
        }
    }

    fn close(&self, reason: SubscriptionClosed) {
        let _ = self.sender.send(FeedItem::Closed(reason));
    }
}
