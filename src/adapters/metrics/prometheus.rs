//! Prometheus Metrics Registry - Feed Observability
//!
//! Counters and gauges for the live feed. All metrics follow the
//! naming convention `live_feed_*`.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Centralized Prometheus metrics for the binder.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Frames seen, labelled `outcome` = accepted | rejected.
    pub frames: IntCounterVec,
    /// Size of the current value.
    pub entities: IntGauge,
    /// Connection lifecycle events, labelled `event` = opened | lost | closed.
    pub connections: IntCounterVec,
    /// 1 while a transport link is open.
    pub link_open: IntGauge,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    ///
    /// # Errors
    /// Fails only if a metric definition is rejected by the registry.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let frames = IntCounterVec::new(
            Opts::new("live_feed_frames_total", "Inbound frames by decode outcome"),
            &["outcome"],
        )?;

        let entities = IntGauge::new(
            "live_feed_entities",
            "Number of vehicles in the current value",
        )?;

        let connections = IntCounterVec::new(
            Opts::new(
                "live_feed_connections_total",
                "Connections opened and closed by the binder",
            ),
            &["event"],
        )?;

        let link_open = IntGauge::new(
            "live_feed_link_open",
            "Transport link status (1=open, 0=closed)",
        )?;

        registry.register(Box::new(frames.clone()))?;
        registry.register(Box::new(entities.clone()))?;
        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(link_open.clone()))?;

        Ok(Self {
            registry,
            frames,
            entities,
            connections,
            link_open,
        })
    }

    pub fn frame_accepted(&self, entities: usize) {
        self.frames.with_label_values(&["accepted"]).inc();
        self.entities
            .set(i64::try_from(entities).unwrap_or(i64::MAX));
    }

    pub fn frame_rejected(&self) {
        self.frames.with_label_values(&["rejected"]).inc();
    }

    pub fn connection_opened(&self) {
        self.connections.with_label_values(&["opened"]).inc();
        self.link_open.set(1);
    }

    pub fn connection_closed(&self) {
        self.connections.with_label_values(&["closed"]).inc();
        self.link_open.set(0);
    }

    /// The peer closed the link or the transport failed.
    pub fn link_lost(&self) {
        self.connections.with_label_values(&["lost"]).inc();
        self.link_open.set(0);
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
