//! Live Feed Binder - One Connection, One Current Value
//!
//! Opens a single duplex connection through the `Connector` port, decodes
//! every inbound frame as a full snapshot list and replaces the current
//! value with it. Consumers read the value with [`LiveFeedBinder::current`]
//! or get notified through [`LiveFeedBinder::subscribe`].
//!
//! Lifecycle:
//! - `start`:        Idle | Stopped → Connected
//! - `stop`:         Connected → Stopped (no-op otherwise)
//! - `set_endpoint`: Connected → Connected (internal stop + start)
//!
//! Frames are applied inside the watch channel's lock together with a
//! generation check. `stop` bumps the generation under the same lock, so
//! once it returns no frame from the old connection can land.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::snapshot::{decode_frame, ElementValidation, EntitySnapshot};
use crate::error::{DecodeError, FeedError};
use crate::ports::transport::{Connector, Endpoint, FrameStream};

/// The value exposed to consumers: the last accepted frame, whole.
pub type Current = Arc<[EntitySnapshot]>;

/// Binder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
    /// Never started.
    Idle,
    /// A connection is owned by the binder (it may have been closed by the peer).
    Connected,
    /// Stopped explicitly; may be started again.
    Stopped,
}

/// Behavior switches for the binder.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinderOptions {
    /// Per-element checking applied while decoding frames.
    pub validation: ElementValidation,
    /// Clear the current value as soon as the endpoint changes instead of
    /// keeping it until the new connection delivers its first frame.
    pub reset_on_endpoint_change: bool,
}

/// Point-in-time copy of the binder's diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    /// Connections ended by the peer or by a transport error.
    pub connections_lost: u64,
    pub link_open: bool,
    /// Text of the most recent decode error, if any frame was ever rejected.
    pub last_decode_error: Option<String>,
}

/// Live diagnostics shared with the reader task and health probes.
#[derive(Debug, Default)]
pub struct FeedStatus {
    frames_accepted: AtomicU64,
    frames_rejected: AtomicU64,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    connections_lost: AtomicU64,
    link_open: AtomicBool,
    last_decode_error: RwLock<Option<String>>,
}

impl FeedStatus {
    pub fn is_link_open(&self) -> bool {
        self.link_open.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> FeedStats {
        FeedStats {
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_lost: self.connections_lost.load(Ordering::Relaxed),
            link_open: self.is_link_open(),
            last_decode_error: self
                .last_decode_error
                .read()
                .ok()
                .and_then(|guard| guard.clone()),
        }
    }

    fn record_rejection(&self, error: &DecodeError) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_decode_error.write() {
            *guard = Some(error.to_string());
        }
    }
}

/// Result of handing one frame from a connection to the binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Applied(usize),
    /// The connection was stopped or replaced before the frame landed.
    Stale,
}

/// State shared between the binder and its reader task.
struct Shared {
    value_tx: watch::Sender<Current>,
    generation: AtomicU64,
    validation: ElementValidation,
    status: Arc<FeedStatus>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Shared {
    /// Decode a frame, recording it as rejected on failure.
    fn decode(&self, raw: &str) -> Result<Vec<EntitySnapshot>, DecodeError> {
        decode_frame(raw, self.validation).inspect_err(|e| {
            warn!(error = %e, len = raw.len(), "Dropping undecodable frame");
            self.status.record_rejection(e);
            if let Some(metrics) = &self.metrics {
                metrics.frame_rejected();
            }
        })
    }

    /// Replace the current value unconditionally.
    fn apply(&self, raw: &str) -> Result<usize, DecodeError> {
        let snapshots = self.decode(raw)?;
        let count = snapshots.len();
        self.value_tx.send_replace(snapshots.into());
        self.record_accepted(count);
        Ok(count)
    }

    /// Replace the current value if `generation` is still the live one.
    fn apply_from(&self, raw: &str, generation: u64) -> Result<FrameOutcome, DecodeError> {
        let snapshots = self.decode(raw)?;
        let count = snapshots.len();
        let next: Current = snapshots.into();
        let mut stale = false;

        self.value_tx.send_if_modified(|value| {
            if generation != self.generation.load(Ordering::Acquire) {
                stale = true;
                return false;
            }
            *value = next;
            true
        });

        if stale {
            debug!("Discarding frame from a retired connection");
            return Ok(FrameOutcome::Stale);
        }

        self.record_accepted(count);
        Ok(FrameOutcome::Applied(count))
    }

    fn record_accepted(&self, count: usize) {
        self.status.frames_accepted.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.frame_accepted(count);
        }
        debug!(entities = count, "Current value replaced");
    }

    /// Retire every frame still in flight from the current connection.
    fn retire_generation(&self) {
        self.value_tx.send_if_modified(|_| {
            self.generation.fetch_add(1, Ordering::AcqRel);
            false
        });
    }

    fn link_lost(&self) {
        self.status.connections_lost.fetch_add(1, Ordering::Relaxed);
        self.status.link_open.store(false, Ordering::Release);
        if let Some(metrics) = &self.metrics {
            metrics.link_lost();
        }
    }

    fn clear(&self) {
        self.value_tx.send_replace(Current::from(Vec::new()));
        if let Some(metrics) = &self.metrics {
            metrics.entities.set(0);
        }
    }
}

/// The connection currently owned by the binder.
struct Connection {
    endpoint: Endpoint,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Binds one live feed to one current value.
pub struct LiveFeedBinder {
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    options: BinderOptions,
    state: BinderState,
    endpoint: Option<Endpoint>,
    connection: Option<Connection>,
}

impl LiveFeedBinder {
    /// Create an idle binder with an empty current value.
    pub fn new(connector: Arc<dyn Connector>, options: BinderOptions) -> Self {
        Self::build(connector, options, None)
    }

    /// Create an idle binder that also reports to Prometheus.
    pub fn with_metrics(
        connector: Arc<dyn Connector>,
        options: BinderOptions,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self::build(connector, options, Some(metrics))
    }

    fn build(
        connector: Arc<dyn Connector>,
        options: BinderOptions,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        let (value_tx, _) = watch::channel(Current::from(Vec::new()));

        Self {
            connector,
            shared: Arc::new(Shared {
                value_tx,
                generation: AtomicU64::new(0),
                validation: options.validation,
                status: Arc::new(FeedStatus::default()),
                metrics,
            }),
            options,
            state: BinderState::Idle,
            endpoint: None,
            connection: None,
        }
    }

    pub const fn state(&self) -> BinderState {
        self.state
    }

    /// Endpoint of the live connection, or the one recorded for the next start.
    pub const fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// The current value. Empty until the first valid frame.
    pub fn current(&self) -> Current {
        self.shared.value_tx.borrow().clone()
    }

    /// Change notifications. Only the latest value is guaranteed to be seen.
    pub fn subscribe(&self) -> watch::Receiver<Current> {
        self.shared.value_tx.subscribe()
    }

    pub fn stats(&self) -> FeedStats {
        self.shared.status.snapshot()
    }

    /// Shared diagnostics handle, e.g. for readiness probes.
    pub fn status(&self) -> Arc<FeedStatus> {
        Arc::clone(&self.shared.status)
    }

    /// Decode and apply one frame directly, outside of any connection.
    ///
    /// On success the current value is replaced in full and the number of
    /// snapshots is returned. On failure the current value is untouched.
    ///
    /// # Errors
    /// Returns the [`DecodeError`] that caused the frame to be dropped.
    pub fn on_frame(&self, raw: &str) -> Result<usize, DecodeError> {
        self.shared.apply(raw)
    }

    /// Open one connection to `endpoint` and start applying its frames.
    ///
    /// # Errors
    /// `FeedError::AlreadyRunning` if a connection is already owned, or the
    /// connector's error if the connection cannot be opened. The state is
    /// unchanged on error.
    pub async fn start(&mut self, endpoint: impl Into<Endpoint>) -> Result<(), FeedError> {
        let endpoint = endpoint.into();

        if let Some(conn) = &self.connection {
            return Err(FeedError::AlreadyRunning(conn.endpoint.to_string()));
        }

        self.endpoint = Some(endpoint.clone());
        self.connect(endpoint).await?;
        self.state = BinderState::Connected;
        Ok(())
    }

    /// Close the connection and wait for its reader to finish.
    ///
    /// Idempotent. Once this returns no further frame is applied, whatever
    /// the transport still delivers.
    pub async fn stop(&mut self) {
        if self.disconnect().await {
            self.state = BinderState::Stopped;
        }
    }

    /// Point the binder at a new endpoint.
    ///
    /// While connected, the old connection is closed and a new one opened;
    /// otherwise the endpoint is only recorded for the next `start`.
    ///
    /// # Errors
    /// The connector's error if the new connection cannot be opened; the
    /// old one is already closed by then and the binder ends up `Stopped`.
    pub async fn set_endpoint(&mut self, endpoint: impl Into<Endpoint>) -> Result<(), FeedError> {
        let endpoint = endpoint.into();

        if self.endpoint.as_ref() == Some(&endpoint) {
            debug!(endpoint = %endpoint, "Endpoint unchanged");
            return Ok(());
        }

        info!(
            from = ?self.endpoint.as_ref().map(Endpoint::as_str),
            to = %endpoint,
            "Feed endpoint changed"
        );

        let was_connected = self.disconnect().await;
        if self.options.reset_on_endpoint_change {
            self.shared.clear();
        }
        self.endpoint = Some(endpoint.clone());

        if !was_connected {
            return Ok(());
        }

        match self.connect(endpoint).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = BinderState::Stopped;
                Err(e)
            }
        }
    }

    /// Follow an endpoint coming from configuration.
    ///
    /// Does nothing if `endpoint` is the one already recorded. Otherwise it
    /// switches the live connection, or starts one when none is owned.
    ///
    /// # Errors
    /// The error of the underlying `set_endpoint` or `start`.
    pub async fn follow_endpoint(&mut self, endpoint: impl Into<Endpoint>) -> Result<(), FeedError> {
        let endpoint = endpoint.into();

        if self.endpoint.as_ref() == Some(&endpoint) {
            debug!(endpoint = %endpoint, "Configured endpoint unchanged");
            return Ok(());
        }

        if self.connection.is_some() {
            self.set_endpoint(endpoint).await
        } else {
            self.start(endpoint).await
        }
    }

    async fn connect(&mut self, endpoint: Endpoint) -> Result<(), FeedError> {
        info!(endpoint = %endpoint, "Opening feed connection");

        let stream = self
            .connector
            .connect(&endpoint)
            .await
            .inspect_err(|e| warn!(endpoint = %endpoint, error = %e, "Feed connection failed"))?;

        let shared = Arc::clone(&self.shared);
        let generation = shared.generation.load(Ordering::Acquire);
        shared.status.connections_opened.fetch_add(1, Ordering::Relaxed);
        shared.status.link_open.store(true, Ordering::Release);
        if let Some(metrics) = &shared.metrics {
            metrics.connection_opened();
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let span = info_span!("feed_reader", endpoint = %endpoint, generation);
        let task = tokio::spawn(read_frames(shared, stream, stop_rx, generation).instrument(span));

        self.connection = Some(Connection {
            endpoint,
            stop_tx,
            task,
        });
        Ok(())
    }

    /// Retire and close the owned connection. Returns whether there was one.
    async fn disconnect(&mut self) -> bool {
        let Some(conn) = self.connection.take() else {
            return false;
        };

        self.shared.retire_generation();
        let _ = conn.stop_tx.send(());

        if let Err(e) = conn.task.await {
            warn!(endpoint = %conn.endpoint, error = %e, "Feed reader task ended abnormally");
        }

        info!(endpoint = %conn.endpoint, "Feed connection stopped");
        true
    }
}

impl Drop for LiveFeedBinder {
    fn drop(&mut self) {
        // Dropping the stop sender ends the reader, which closes the stream.
        if self.connection.is_some() {
            self.shared.retire_generation();
        }
    }
}

/// Reader task: apply frames in arrival order until stopped or closed.
async fn read_frames(
    shared: Arc<Shared>,
    mut stream: Box<dyn FrameStream>,
    mut stop_rx: oneshot::Receiver<()>,
    generation: u64,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                debug!("Stop requested");
                break;
            }
            frame = stream.next_frame() => {
                match frame {
                    Some(Ok(text)) => {
                        // Decode errors are already recorded by `apply`.
                        let _ = shared.apply_from(&text, generation);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Feed transport failed, no further frames will arrive");
                        shared.link_lost();
                        break;
                    }
                    None => {
                        warn!("Feed closed by peer, no further frames will arrive");
                        shared.link_lost();
                        break;
                    }
                }
            }
        }
    }

    stream.close().await;

    shared.status.connections_closed.fetch_add(1, Ordering::Relaxed);
    shared.status.link_open.store(false, Ordering::Release);
    if let Some(metrics) = &shared.metrics {
        metrics.connection_closed();
    }
}
