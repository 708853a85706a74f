//! Shared dashboard state
//!
//! State shared between the pollers and the coordinator: the selected mode,
//! one snapshot slot per mode, the staging area and the submission flag.
//!
//! Snapshot writes are atomic replacements guarded by a per-slot dispatch
//! sequence: a result is written only if its fetch was dispatched after the
//! one currently held ("last requested wins", not "last arrived wins").

use mpdash_common::events::EventBus;
use mpdash_common::time::Timestamp;
use mpdash_common::{DisplaySnapshot, Mode};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::staged::StagedFile;

/// Poll health counters for one slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotHealth {
    /// Fetches dispatched (scheduled ticks and manual refreshes)
    pub total_ticks: u64,
    /// Failed fetches since startup
    pub total_failures: u64,
    /// Failures in a row, reset by the next written snapshot
    pub consecutive_failures: u64,
    /// Results dropped because a newer one was already written
    pub stale_discards: u64,
    /// Most recent failure description
    pub last_error: Option<String>,
    /// When the slot was last written
    pub last_success_at: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct Slot {
    snapshot: Option<Arc<DisplaySnapshot>>,
    health: SlotHealth,
}

/// Result of offering a snapshot to its slot
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// The slot now holds the snapshot; `replaced` is what it held before
    Written {
        replaced: Option<Arc<DisplaySnapshot>>,
    },
    /// A snapshot from a later dispatch is already held; nothing changed
    Stale { latest_sequence: u64 },
}

/// File staging area
#[derive(Debug, Clone, Default)]
pub struct Staging {
    /// File awaiting submission
    pub file: Option<StagedFile>,
    /// Hide upload snapshots with a lower sequence than this
    ///
    /// Set when a file is selected (hide everything), lowered to the next
    /// dispatch sequence when a submission succeeds, cleared when the staging
    /// cycle ends without a submission.
    pub hide_upload_before: Option<u64>,
}

/// Shared state accessible by the pollers and the coordinator
///
/// Uses RwLock for concurrent read access with rare writes
pub struct SharedState {
    /// Currently selected mode
    pub mode: RwLock<Mode>,

    /// Staged file and upload visibility
    pub staging: RwLock<Staging>,

    /// Event broadcaster
    pub events: EventBus,

    upload_slot: RwLock<Slot>,
    live_slot: RwLock<Slot>,
    upload_sequence: AtomicU64,
    live_sequence: AtomicU64,
    submitting: AtomicBool,
}

impl SharedState {
    /// Create new shared state starting in `mode`
    pub fn new(mode: Mode, events: EventBus) -> Self {
        Self {
            mode: RwLock::new(mode),
            staging: RwLock::new(Staging::default()),
            events,
            upload_slot: RwLock::new(Slot::default()),
            live_slot: RwLock::new(Slot::default()),
            upload_sequence: AtomicU64::new(0),
            live_sequence: AtomicU64::new(0),
            submitting: AtomicBool::new(false),
        }
    }

    fn slot(&self, mode: Mode) -> &RwLock<Slot> {
        match mode {
            Mode::Upload => &self.upload_slot,
            Mode::Live => &self.live_slot,
        }
    }

    fn sequence(&self, mode: Mode) -> &AtomicU64 {
        match mode {
            Mode::Upload => &self.upload_sequence,
            Mode::Live => &self.live_sequence,
        }
    }

    /// Get currently selected mode
    pub async fn get_mode(&self) -> Mode {
        *self.mode.read().await
    }

    /// Allocate the sequence number for a fetch about to be dispatched
    ///
    /// Sequences start at 1 and increase by one per dispatch.
    pub fn next_sequence(&self, mode: Mode) -> u64 {
        self.sequence(mode).fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Sequence the next dispatched fetch will receive
    pub fn peek_next_sequence(&self, mode: Mode) -> u64 {
        self.sequence(mode).load(Ordering::SeqCst) + 1
    }

    /// Whether a snapshot should be shown by the presentation layer now
    ///
    /// Only the selected mode is visible; an upload snapshot is also hidden
    /// while the staging cycle says so.
    pub async fn is_visible(&self, snapshot: &DisplaySnapshot) -> bool {
        if self.get_mode().await != snapshot.mode {
            return false;
        }
        match snapshot.mode {
            Mode::Live => true,
            Mode::Upload => match self.staging.read().await.hide_upload_before {
                Some(threshold) => snapshot.sequence >= threshold,
                None => true,
            },
        }
    }

    /// Offer a snapshot to its slot
    pub async fn publish(&self, snapshot: DisplaySnapshot) -> PublishOutcome {
        let mut slot = self.slot(snapshot.mode).write().await;

        let held = slot.snapshot.as_ref().map_or(0, |s| s.sequence);
        if snapshot.sequence <= held {
            slot.health.stale_discards += 1;
            return PublishOutcome::Stale {
                latest_sequence: held,
            };
        }

        slot.health.consecutive_failures = 0;
        slot.health.last_success_at = Some(snapshot.fetched_at);
        let replaced = slot.snapshot.replace(Arc::new(snapshot));
        PublishOutcome::Written { replaced }
    }

    /// Record a failed fetch; returns the consecutive failure count
    pub async fn record_failure(&self, mode: Mode, error: &str) -> u64 {
        let mut slot = self.slot(mode).write().await;
        slot.health.total_failures += 1;
        slot.health.consecutive_failures += 1;
        slot.health.last_error = Some(error.to_string());
        slot.health.consecutive_failures
    }

    /// Latest snapshot held for a mode, visible or not
    pub async fn snapshot(&self, mode: Mode) -> Option<Arc<DisplaySnapshot>> {
        self.slot(mode).read().await.snapshot.clone()
    }

    /// Poll health counters for a mode
    pub async fn health(&self, mode: Mode) -> SlotHealth {
        let mut health = self.slot(mode).read().await.health.clone();
        health.total_ticks = self.sequence(mode).load(Ordering::SeqCst);
        health
    }

    /// Claim the submission flag; false if a submission is already in flight
    pub fn try_begin_submit(&self) -> bool {
        self.submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the submission flag
    pub fn end_submit(&self) {
        self.submitting.store(false, Ordering::SeqCst);
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }
}
