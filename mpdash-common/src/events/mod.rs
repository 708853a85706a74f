//! Event types for the dashboard event system
//!
//! Provides the shared event definitions and the EventBus used by pollers,
//! the coordinator and whatever front end renders the dashboard.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::snapshot::{DisplaySnapshot, Mode};
use crate::time::Timestamp;

/// Dashboard event types
///
/// Events are broadcast via EventBus and can be serialized for logging or
/// forwarding. All events use this central enum for exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardEvent {
    /// Active mode switched
    ModeChanged {
        /// Mode before the switch
        old_mode: Mode,
        /// Mode after the switch
        new_mode: Mode,
        /// When the switch happened
        timestamp: Timestamp,
    },

    /// A file was staged for submission
    FileStaged {
        /// Staged file identity
        file_id: Uuid,
        /// Original file name
        file_name: String,
        /// When the file was staged
        timestamp: Timestamp,
    },

    /// A poller wrote a new snapshot into its slot
    ///
    /// Triggers:
    /// - Front end: re-render when `visible`
    SnapshotUpdated {
        /// The snapshot now held by the slot
        snapshot: DisplaySnapshot,
        /// Whether the slot belongs to the currently selected mode
        visible: bool,
    },

    /// A poll tick failed; the previous snapshot is retained
    PollFailed {
        /// Poller that failed
        mode: Mode,
        /// Failure description
        error: String,
        /// Failures in a row for this slot, including this one
        consecutive_failures: u64,
        /// When the failure was observed
        timestamp: Timestamp,
    },

    /// A tick result arrived after a newer one had already been written
    StaleResultDiscarded {
        /// Slot the result was meant for
        mode: Mode,
        /// Sequence of the discarded result
        sequence: u64,
        /// Sequence already held by the slot
        latest_sequence: u64,
    },

    /// An alert burst was triggered
    AlertFired {
        /// Poller whose sample crossed the threshold
        mode: Mode,
        /// Plastic share of the triggering sample
        percent_plastic: f64,
        /// When the burst started
        timestamp: Timestamp,
    },

    /// A submission was sent to the detection service
    SubmissionStarted {
        file_id: Uuid,
        file_name: String,
        timestamp: Timestamp,
    },

    /// The detection service accepted a submission
    SubmissionSucceeded {
        file_id: Uuid,
        file_name: String,
        timestamp: Timestamp,
    },

    /// A submission failed; the file stays staged for retry
    SubmissionFailed {
        file_id: Uuid,
        file_name: String,
        /// Failure description
        error: String,
        timestamp: Timestamp,
    },
}

impl DashboardEvent {
    /// Stable snake_case name of the event variant
    pub fn event_type(&self) -> &'static str {
        match self {
            DashboardEvent::ModeChanged { .. } => "mode_changed",
            DashboardEvent::FileStaged { .. } => "file_staged",
            DashboardEvent::SnapshotUpdated { .. } => "snapshot_updated",
            DashboardEvent::PollFailed { .. } => "poll_failed",
            DashboardEvent::StaleResultDiscarded { .. } => "stale_result_discarded",
            DashboardEvent::AlertFired { .. } => "alert_fired",
            DashboardEvent::SubmissionStarted { .. } => "submission_started",
            DashboardEvent::SubmissionSucceeded { .. } => "submission_succeeded",
            DashboardEvent::SubmissionFailed { .. } => "submission_failed",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block pollers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use mpdash_common::events::{DashboardEvent, EventBus};
/// use mpdash_common::Mode;
///
/// let event_bus = EventBus::new(64);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(DashboardEvent::ModeChanged {
///     old_mode: Mode::Upload,
///     new_mode: Mode::Live,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "mode_changed");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are
    /// dropped for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DashboardEvent,
    ) -> Result<usize, broadcast::error::SendError<DashboardEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DashboardEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
