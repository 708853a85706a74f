//! Operating modes and per-mode display snapshots

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::sample::NormalizedSample;
use crate::time::Timestamp;
use crate::Error;

/// Dashboard input source
///
/// Exactly one mode is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Static image submission and analysis
    Upload,
    /// Continuous device stream
    Live,
}

impl Mode {
    /// Both modes, upload first
    pub const ALL: [Mode; 2] = [Mode::Upload, Mode::Live];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Upload => "upload",
            Mode::Live => "live",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(Mode::Upload),
            "live" => Ok(Mode::Live),
            other => Err(Error::InvalidInput(format!("Unknown mode: {}", other))),
        }
    }
}

/// Good/Poor water quality verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterQuality {
    Good,
    Poor,
}

impl fmt::Display for WaterQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaterQuality::Good => f.write_str("Good"),
            WaterQuality::Poor => f.write_str("Poor"),
        }
    }
}

/// Immutable, timestamped view of the latest processed result for one mode
///
/// Snapshots are replaced wholesale, never mutated in place. `sequence` is the
/// number the poller assigned when the fetch was dispatched; a slot only
/// accepts snapshots with a higher sequence than the one it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    /// Mode (slot) this snapshot belongs to
    pub mode: Mode,
    /// Absolute image address, already resolved against the service base
    pub image_url: Option<String>,
    /// Normalized statistics, `None` when the payload carried an image only
    pub stats: Option<NormalizedSample>,
    /// When the fetch completed
    pub fetched_at: Timestamp,
    /// Dispatch sequence of the fetch that produced this snapshot
    pub sequence: u64,
}

impl DisplaySnapshot {
    /// Quality verdict, if statistics are present
    pub fn quality(&self) -> Option<WaterQuality> {
        self.stats.as_ref().map(NormalizedSample::quality)
    }

    /// Same mode, image and statistics; fetch time and sequence are ignored
    pub fn same_result(&self, other: &DisplaySnapshot) -> bool {
        self.mode == other.mode && self.image_url == other.image_url && self.stats == other.stats
    }
}

/// Text rendering of a sample the way the dashboard stats panel shows it
pub struct StatsSummary<'a>(pub &'a NormalizedSample);

impl fmt::Display for StatsSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(
            f,
            "particles={} water={:.1}% plastic={:.1}% density=",
            s.particle_count, s.percent_water, s.percent_plastic
        )?;
        match s.density {
            Some(d) => write!(f, "{:.2} particles/mL", d)?,
            None => f.write_str("N/A")?,
        }
        write!(f, " quality={}", s.quality())
    }
}
