//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wall-clock timestamp used for snapshots, events and alert bookkeeping
pub type Timestamp = DateTime<Utc>;

/// Get current UTC timestamp
pub fn now() -> Timestamp {
    Utc::now()
}

/// Time elapsed from `earlier` to `later`
///
/// Returns `Duration::ZERO` when `later` is not after `earlier` (clock steps
/// backwards are treated as no time passing).
pub fn elapsed_between(earlier: Timestamp, later: Timestamp) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// Wall-clock timestamps that advance with the runtime's clock
///
/// Reads the wall clock once at construction, then advances by
/// `tokio::time::Instant`, so successive readings never step backwards and
/// follow paused time in tests. Poll ticks and alert cooldowns are measured
/// against this clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall: Timestamp,
    anchor: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: now(),
            anchor: tokio::time::Instant::now(),
        }
    }

    /// Current timestamp on this clock
    pub fn now(&self) -> Timestamp {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.anchor_wall + elapsed
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
