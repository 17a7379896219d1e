//! Periodic sampling and fan-out to `/stats` subscribers.
//!
//! A single [`Sampler`] builds one snapshot per tick and publishes the
//! rendered frame through a [`FrameHub`]. Every connected client owns a
//! broadcast receiver wrapped in [`client_stream`]; dropping the stream (the
//! client went away) drops the receiver and nothing else.

use crate::collectors::{MetricsProvider, ProviderError};
use crate::config::{FailurePolicy, ThresholdsConfig};
use crate::metrics::Metrics;
use crate::render::{render_stats, RenderError};
use crate::snapshot::{build_snapshot, Snapshot};
use axum::response::sse::Event;
use futures_core::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Fixed pause between the end of one tick and the start of the next.
pub const TICK_PAUSE: Duration = Duration::from_secs(1);

/// A rendered tick, ready to be written to any number of clients.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub snapshot: Snapshot,
    /// Stats fragment collapsed to a single line.
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("sampling task failed: {0}")]
    Join(#[from] JoinError),
}

impl TickError {
    pub fn kind(&self) -> &'static str {
        match self {
            TickError::Provider(err) => err.kind(),
            TickError::Render(_) => "render",
            TickError::Join(_) => "join",
        }
    }
}

/// Latest frame plus the broadcast channel that carries new ones.
pub struct FrameHub {
    tx: broadcast::Sender<Arc<Frame>>,
    latest: RwLock<Option<Arc<Frame>>>,
}

impl FrameHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            tx,
            latest: RwLock::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.tx.subscribe()
    }

    pub async fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    async fn publish(&self, frame: Arc<Frame>) {
        *self.latest.write().await = Some(frame.clone());
        // No subscribers is fine; the frame is still kept as latest.
        let _ = self.tx.send(frame);
    }
}

/// Builds and renders one tick. Blocks for the CPU sampling window.
pub fn sample_once(
    provider: &dyn MetricsProvider,
    disk_path: &str,
    thresholds: &ThresholdsConfig,
) -> Result<(Snapshot, String), TickError> {
    let snapshot = build_snapshot(provider, disk_path)?;
    let html = render_stats(&snapshot, thresholds)?;
    Ok((snapshot, collapse_lines(&html)))
}

pub fn collapse_lines(fragment: &str) -> String {
    fragment.replace(['\n', '\r'], "")
}

/// Milliseconds for log fields, saturating instead of truncating.
fn whole_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

pub struct Sampler {
    provider: Arc<dyn MetricsProvider>,
    disk_path: String,
    thresholds: ThresholdsConfig,
    policy: FailurePolicy,
    pause: Duration,
    hub: Arc<FrameHub>,
    metrics: Arc<Metrics>,
}

impl Sampler {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        disk_path: String,
        thresholds: ThresholdsConfig,
        policy: FailurePolicy,
        hub: Arc<FrameHub>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            provider,
            disk_path,
            thresholds,
            policy,
            pause: TICK_PAUSE,
            hub,
            metrics,
        }
    }

    #[cfg(test)]
    fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Runs until `shutdown` flips (or its sender is dropped).
    ///
    /// Returns an error only when a tick fails under [`FailurePolicy::Exit`].
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), TickError> {
        let mut seq = 0_u64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let provider = self.provider.clone();
            let disk_path = self.disk_path.clone();
            let thresholds = self.thresholds.clone();
            let task = tokio::task::spawn_blocking(move || {
                sample_once(provider.as_ref(), &disk_path, &thresholds)
            });

            let result = tokio::select! {
                _ = shutdown.changed() => break,
                joined = task => joined.map_err(TickError::from).and_then(|r| r),
            };
            let elapsed = started.elapsed();

            match result {
                Ok((snapshot, payload)) => {
                    seq += 1;
                    if seq == 1 {
                        info!(
                            duration_ms = whole_millis(elapsed),
                            cores = snapshot.cpu_loads.len(),
                            sensors = snapshot.temperatures.len(),
                            "first snapshot collected"
                        );
                    } else {
                        debug!(
                            duration_ms = whole_millis(elapsed),
                            seq,
                            subscribers = self.hub.subscriber_count(),
                            "tick completed"
                        );
                    }
                    self.metrics
                        .update_from_snapshot(&snapshot, elapsed.as_secs_f64());
                    self.hub
                        .publish(Arc::new(Frame {
                            seq,
                            snapshot,
                            payload,
                        }))
                        .await;
                }
                Err(err) => {
                    self.metrics.inc_tick_error(err.kind());
                    match self.policy {
                        FailurePolicy::Skip => {
                            warn!(error = %err, kind = err.kind(), "tick skipped");
                        }
                        FailurePolicy::Exit => {
                            error!(
                                error = %err,
                                kind = err.kind(),
                                "tick failed, stopping sampler"
                            );
                            return Err(err);
                        }
                    }
                }
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.pause) => {}
            }
        }

        info!("sampler stopped");
        Ok(())
    }
}

struct ClientGuard {
    metrics: Arc<Metrics>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let active = self.metrics.client_disconnected();
        info!(active_clients = active, "stats client disconnected");
    }
}

/// Event stream for one `/stats` client.
///
/// Starts with the most recent frame (if any), then follows the sampler.
/// Ends on shutdown or when the sampler goes away.
pub fn client_stream(
    hub: Arc<FrameHub>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let active = metrics.client_connected();
    info!(active_clients = active, "stats client connected");
    let mut rx = hub.subscribe();
    let guard = ClientGuard { metrics };

    async_stream::stream! {
        let _guard = guard;
        let mut last_seq = 0_u64;

        if let Some(frame) = hub.latest().await {
            last_seq = frame.seq;
            yield Ok(Event::default().data(frame.payload.as_str()));
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            let received = tokio::select! {
                _ = shutdown.changed() => None,
                received = rx.recv() => Some(received),
            };
            let Some(received) = received else {
                break;
            };

            match received {
                Ok(frame) => {
                    if frame.seq <= last_seq {
                        continue;
                    }
                    last_seq = frame.seq;
                    yield Ok(Event::default().data(frame.payload.as_str()));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "stats client lagged, skipping ahead");
                    // The receiver resumes at the oldest buffered frame; jump
                    // to the newest instead and let the seq check drop the rest.
                    if let Some(frame) = hub.latest().await {
                        if frame.seq > last_seq {
                            last_seq = frame.seq;
                            yield Ok(Event::default().data(frame.payload.as_str()));
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
