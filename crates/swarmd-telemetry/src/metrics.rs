//! Prometheus registry for the torrent engine.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{CollectorStage, Result, TelemetryError};

/// Engine metrics. Cloning shares the underlying registry.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    alerts_received_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    active_torrents: IntGauge,
    active_subscriptions: IntGauge,
    add_latency_ms: IntGauge,
    add_timeouts_total: IntCounter,
    data_deletion_failures_total: IntCounter,
    repository_failures_total: IntCounter,
}

/// Point-in-time view of the scalar collectors.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Torrents currently in the registry.
    pub active_torrents: i64,
    /// Open state-provider subscriptions.
    pub active_subscriptions: i64,
    /// Latency of the most recent synchronous add (ms).
    pub add_latency_ms: i64,
    /// Synchronous adds abandoned after the timeout.
    pub add_timeouts_total: u64,
    /// Deletions whose payload removal failed.
    pub data_deletion_failures_total: u64,
    /// Failed metadata repository writes.
    pub repository_failures_total: u64,
}

impl Metrics {
    /// Build a registry with every collector registered.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let alerts_received_total = built(
            "alerts_received_total",
            IntCounterVec::new(
                Opts::new("alerts_received_total", "Native alerts drained by kind"),
                &["kind"],
            ),
        )?;
        let events_emitted_total = built(
            "events_emitted_total",
            IntCounterVec::new(
                Opts::new("events_emitted_total", "Domain events published by type"),
                &["type"],
            ),
        )?;
        let active_torrents = built(
            "active_torrents",
            IntGauge::with_opts(Opts::new("active_torrents", "Torrents under management")),
        )?;
        let active_subscriptions = built(
            "active_subscriptions",
            IntGauge::with_opts(Opts::new(
                "active_subscriptions",
                "Open state observation subscriptions",
            )),
        )?;
        let add_latency_ms = built(
            "add_latency_ms",
            IntGauge::with_opts(Opts::new(
                "add_latency_ms",
                "Latency of the latest synchronous add (ms)",
            )),
        )?;
        let add_timeouts_total = built(
            "add_timeouts_total",
            IntCounter::with_opts(Opts::new(
                "add_timeouts_total",
                "Synchronous adds that timed out",
            )),
        )?;
        let data_deletion_failures_total = built(
            "data_deletion_failures_total",
            IntCounter::with_opts(Opts::new(
                "data_deletion_failures_total",
                "Payload deletions that failed",
            )),
        )?;
        let repository_failures_total = built(
            "repository_failures_total",
            IntCounter::with_opts(Opts::new(
                "repository_failures_total",
                "Metadata repository operations that failed",
            )),
        )?;

        register(&registry, "alerts_received_total", &alerts_received_total)?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "active_torrents", &active_torrents)?;
        register(&registry, "active_subscriptions", &active_subscriptions)?;
        register(&registry, "add_latency_ms", &add_latency_ms)?;
        register(&registry, "add_timeouts_total", &add_timeouts_total)?;
        register(
            &registry,
            "data_deletion_failures_total",
            &data_deletion_failures_total,
        )?;
        register(
            &registry,
            "repository_failures_total",
            &repository_failures_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                alerts_received_total,
                events_emitted_total,
                active_torrents,
                active_subscriptions,
                add_latency_ms,
                add_timeouts_total,
                data_deletion_failures_total,
                repository_failures_total,
            }),
        })
    }

    /// Count a drained native alert.
    pub fn inc_alert(&self, kind: &str) {
        self.inner
            .alerts_received_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count a published domain event.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Set the managed torrent gauge.
    pub fn set_active_torrents(&self, count: usize) {
        self.inner
            .active_torrents
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// A subscription opened.
    pub fn subscription_opened(&self) {
        self.inner.active_subscriptions.inc();
    }

    /// A subscription closed.
    pub fn subscription_closed(&self) {
        self.inner.active_subscriptions.dec();
    }

    /// Record how long a synchronous add took to become usable.
    pub fn observe_add_latency(&self, duration: Duration) {
        self.inner
            .add_latency_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Count a synchronous add timeout.
    pub fn inc_add_timeout(&self) {
        self.inner.add_timeouts_total.inc();
    }

    /// Count a failed payload deletion.
    pub fn inc_data_deletion_failure(&self) {
        self.inner.data_deletion_failures_total.inc();
    }

    /// Count a failed repository operation.
    pub fn inc_repository_failure(&self) {
        self.inner.repository_failures_total.inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Exposition`] or
    /// [`TelemetryError::ExpositionUtf8`] when rendering fails.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::Exposition { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::ExpositionUtf8 { source })
    }

    /// Snapshot the scalar collectors.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_torrents: self.inner.active_torrents.get(),
            active_subscriptions: self.inner.active_subscriptions.get(),
            add_latency_ms: self.inner.add_latency_ms.get(),
            add_timeouts_total: self.inner.add_timeouts_total.get(),
            data_deletion_failures_total: self.inner.data_deletion_failures_total.get(),
            repository_failures_total: self.inner.repository_failures_total.get(),
        }
    }

    /// Alerts counted for `kind` so far.
    #[must_use]
    pub fn alerts_received(&self, kind: &str) -> u64 {
        self.inner
            .alerts_received_total
            .with_label_values(&[kind])
            .get()
    }

    /// Events counted for `event_type` so far.
    #[must_use]
    pub fn events_emitted(&self, event_type: &str) -> u64 {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .get()
    }

    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

fn built<T>(metric: &'static str, result: prometheus::Result<T>) -> Result<T> {
    result.map_err(|source| TelemetryError::Collector {
        metric,
        stage: CollectorStage::Build,
        source,
    })
}

fn register<C>(registry: &Registry, metric: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Collector {
            metric,
            stage: CollectorStage::Register,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ms_saturates() {
        assert_eq!(
            Metrics::duration_to_ms(Duration::from_secs(u64::MAX / 2)),
            i64::MAX
        );
        assert_eq!(Metrics::duration_to_ms(Duration::from_millis(42)), 42);
    }

    #[test]
    fn snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_alert("state_changed");
        metrics.inc_alert("state_changed");
        metrics.inc_event("torrent_added");
        metrics.set_active_torrents(3);
        metrics.subscription_opened();
        metrics.subscription_opened();
        metrics.subscription_closed();
        metrics.observe_add_latency(Duration::from_millis(15));
        metrics.inc_add_timeout();
        metrics.inc_data_deletion_failure();
        metrics.inc_repository_failure();

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                active_torrents: 3,
                active_subscriptions: 1,
                add_latency_ms: 15,
                add_timeouts_total: 1,
                data_deletion_failures_total: 1,
                repository_failures_total: 1,
            }
        );
        assert_eq!(metrics.alerts_received("state_changed"), 2);
        assert_eq!(metrics.events_emitted("torrent_added"), 1);
        assert_eq!(metrics.events_emitted("torrent_removed"), 0);

        let rendered = metrics.render()?;
        assert!(rendered.contains("alerts_received_total"));
        assert!(rendered.contains("add_timeouts_total 1"));
        Ok(())
    }

    #[test]
    fn clones_share_registry() -> Result<()> {
        let metrics = Metrics::new()?;
        let clone = metrics.clone();
        clone.set_active_torrents(9);
        assert_eq!(metrics.snapshot().active_torrents, 9);
        Ok(())
    }
}
