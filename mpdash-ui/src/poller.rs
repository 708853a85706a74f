//! Mode-scoped pollers
//!
//! Two independent fixed-interval loops, one per mode. Both run from startup
//! to teardown regardless of the selected mode: switching modes changes what
//! is visible, not what is polled.
//!
//! Each tick runs in its own task so a slow fetch never delays the cadence.
//! Overlapping ticks are ordered by their dispatch sequence when the result
//! is written (see [`SharedState::publish`]).

use mpdash_common::events::DashboardEvent;
use mpdash_common::time::{MonotonicClock, Timestamp};
use mpdash_common::{normalize, DisplaySnapshot, Mode, RawSample};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::AlertHandler;
use crate::client::{live_feed_url, resolve_image_url, DetectionService};
use crate::state::{PublishOutcome, SharedState};

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new snapshot was written to the slot
    Published { sequence: u64, alerted: bool },
    /// The service has no result yet; slot untouched
    NoResult { sequence: u64 },
    /// A later dispatch was already written; result dropped
    Stale { sequence: u64, latest_sequence: u64 },
    /// Fetch failed; previous snapshot retained
    Failed { sequence: u64 },
    /// Dashboard was torn down while the fetch was in flight
    Cancelled { sequence: u64 },
}

/// Everything a tick needs
pub struct PollContext {
    pub state: Arc<SharedState>,
    pub service: Arc<dyn DetectionService>,
    pub alerts: Arc<dyn AlertHandler>,
    pub shutdown: CancellationToken,
    pub clock: MonotonicClock,
}

impl PollContext {
    /// Run one fetch-normalize-store cycle for `mode`
    ///
    /// Never fails: transport and payload errors are recorded on the slot,
    /// logged and emitted as `PollFailed`.
    pub async fn tick(&self, mode: Mode) -> TickOutcome {
        let sequence = self.state.next_sequence(mode);
        debug!(mode = %mode, sequence, "Poll tick dispatched");

        let fetched = match mode {
            Mode::Upload => self.service.fetch_latest_upload().await,
            Mode::Live => self.service.fetch_live_stats().await.map(Some),
        };

        if self.shutdown.is_cancelled() {
            debug!(mode = %mode, sequence, "Discarding tick result after teardown");
            return TickOutcome::Cancelled { sequence };
        }

        let raw = match fetched {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(mode = %mode, sequence, "No result available yet");
                return TickOutcome::NoResult { sequence };
            }
            Err(e) => {
                let error = e.to_string();
                let consecutive_failures = self.state.record_failure(mode, &error).await;
                warn!(
                    mode = %mode,
                    sequence,
                    consecutive_failures,
                    error = %error,
                    "Poll tick failed, keeping previous snapshot"
                );
                self.state.events.emit_lossy(DashboardEvent::PollFailed {
                    mode,
                    error,
                    consecutive_failures,
                    timestamp: self.clock.now(),
                });
                return TickOutcome::Failed { sequence };
            }
        };

        let now = self.clock.now();
        let snapshot = build_snapshot(&raw, mode, sequence, self.service.base_url(), now);
        let stats = snapshot.stats;

        match self.state.publish(snapshot.clone()).await {
            PublishOutcome::Stale { latest_sequence } => {
                debug!(
                    mode = %mode,
                    sequence,
                    latest_sequence,
                    "Discarding result older than the held snapshot"
                );
                self.state.events.emit_lossy(DashboardEvent::StaleResultDiscarded {
                    mode,
                    sequence,
                    latest_sequence,
                });
                TickOutcome::Stale {
                    sequence,
                    latest_sequence,
                }
            }
            PublishOutcome::Written { replaced } => {
                // Upload polling keeps returning the stored result until a new
                // sample is processed; a re-read is not a new sample.
                let repeated = mode == Mode::Upload
                    && replaced.map_or(false, |previous| previous.same_result(&snapshot));
                let visible = self.state.is_visible(&snapshot).await;
                self.state
                    .events
                    .emit_lossy(DashboardEvent::SnapshotUpdated { snapshot, visible });

                let alerted = match stats {
                    Some(_) if repeated => {
                        debug!(mode = %mode, sequence, "Result unchanged, alert not re-evaluated");
                        false
                    }
                    Some(sample) => self.alerts.consider(&sample, now).await,
                    None => false,
                };
                TickOutcome::Published { sequence, alerted }
            }
        }
    }
}

/// Turn a raw service response into the snapshot for `mode`
///
/// Upload snapshots carry the resolved result image; live snapshots carry the
/// address of the continuous stream. An upload payload without statistics
/// yields a snapshot with `stats: None`.
pub fn build_snapshot(
    raw: &RawSample,
    mode: Mode,
    sequence: u64,
    base_url: &str,
    fetched_at: Timestamp,
) -> DisplaySnapshot {
    let image_url = match raw {
        RawSample::Upload(_) => raw.image_path().map(|path| resolve_image_url(base_url, path)),
        RawSample::Live(_) => Some(live_feed_url(base_url)),
    };

    let raw_stats = raw.stats();
    let stats = match raw {
        RawSample::Upload(_) if raw_stats.is_empty() => None,
        _ => Some(normalize(&raw_stats, mode)),
    };

    DisplaySnapshot {
        mode,
        image_url,
        stats,
        fetched_at,
        sequence,
    }
}

/// Start the fixed-interval loop for one mode
///
/// The first tick fires one period after start. The loop stops when the
/// context's shutdown token is cancelled; ticks already in flight finish on
/// their own and drop their results.
pub fn spawn_poller(ctx: Arc<PollContext>, mode: Mode, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(mode = %mode, period_ms = period.as_millis() as u64, "Poller started");

        loop {
            tokio::select! {
                _ = ctx.shutdown.cancelled() => break,
                _ = timer.tick() => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        ctx.tick(mode).await;
                    });
                }
            }
        }

        info!(mode = %mode, "Poller stopped");
    })
}
