//! Event bus routing helpers.

use crate::payloads::{DEFAULT_BUS_CAPACITY, Event, EventEnvelope, EventId};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;

/// Stream wrapper used by subscribers.
pub type EventStream = BroadcastStream<EventEnvelope>;

/// Shared event bus built on top of `tokio::broadcast`.
///
/// Events published while nobody listens are dropped. Slow subscribers see a
/// lag error on their stream and must resynchronise from the registry.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a bus with a custom channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Subscribe to events published from this point on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Subscribe with a raw broadcast receiver.
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publish a new event to all current subscribers and return its id.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        let _ = self.sender.send(envelope);
        id
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::TorrentId;
    use tokio_stream::StreamExt;
    use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

    fn torrent() -> TorrentId {
        TorrentId::from_info_hash(&[7; 20])
    }

    #[tokio::test]
    async fn subscribe_streams_events_in_publish_order() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe();
        let first = bus.publish(Event::TorrentAdded {
            torrent_id: torrent(),
            name: "demo".into(),
        });
        let second = bus.publish(Event::TorrentFinished {
            torrent_id: torrent(),
        });
        assert!(second > first);

        let envelope = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(envelope.id, first);
        assert!(matches!(envelope.event, Event::TorrentAdded { .. }));
        let envelope = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(envelope.id, second);
    }

    #[tokio::test]
    async fn events_without_listeners_are_not_replayed() {
        let bus = EventBus::new();
        let _ = bus.publish(Event::HealthChanged {
            degraded: Vec::new(),
        });
        let mut rx = bus.receiver();
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let bus = EventBus::with_capacity(2);
        let mut stream = bus.subscribe();
        for index in 0..5 {
            let _ = bus.publish(Event::PieceFinished {
                torrent_id: torrent(),
                piece_index: index,
            });
        }
        let first = stream.next().await.expect("stream item");
        assert!(matches!(first, Err(BroadcastStreamRecvError::Lagged(_))));
    }
}
