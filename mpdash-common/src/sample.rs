//! Detection-service payloads and the stat normalizer
//!
//! The detection service answers in two shapes: the upload endpoint returns an
//! optional image path plus a loose `stats` block, the live endpoint returns raw
//! particle/volume counters. Both are reduced to one canonical
//! [`NormalizedSample`] by [`normalize`].
//!
//! Normalization is a two step process:
//! 1. [`classify_raw_sample`] decides which policy applies
//!    ([`SampleShape::Percentage`], [`SampleShape::CountVolume`] or
//!    [`SampleShape::Empty`]), in that priority order.
//! 2. [`normalize`] computes the percentages for that shape and derives the
//!    particle count and density.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::snapshot::{Mode, WaterQuality};

/// Plastic percentage above which a sample is considered poor quality
pub const POOR_QUALITY_THRESHOLD_PERCENT: f64 = 10.0;

/// Heuristic divisor for the density fallback (`particles / 100`)
///
/// The service does not report a unit derivation for this value. It is a
/// placeholder estimate used only when the payload carries no density.
pub const DENSITY_FALLBACK_DIVISOR: f64 = 100.0;

/// Loose statistics block as served by the detection service
///
/// Every field is optional; which ones are present decides the
/// normalization policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStats {
    /// Precomputed plastic share (0-100)
    pub percent_plastic: Option<f64>,
    /// Precomputed water share (0-100), informational only
    pub percent_water: Option<f64>,
    /// Detected objects (live counters)
    pub objects: Option<f64>,
    /// Detected particles (upload results)
    pub count: Option<f64>,
    /// Sample volume in millilitres
    pub water_ml: Option<f64>,
    /// Particle density as reported by the service
    pub density: Option<f64>,
}

impl RawStats {
    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        *self == RawStats::default()
    }
}

/// `GET /api/latest` response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    /// Path of the (annotated) image, usually relative to the service
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    /// Detection statistics, empty before the first upload is processed
    #[serde(default)]
    pub stats: Option<RawStats>,
}

impl UploadPayload {
    /// True when the service has no result yet (no image, no statistics)
    pub fn is_empty(&self) -> bool {
        let no_image = self.image_url.as_deref().map_or(true, str::is_empty);
        let no_stats = self.stats.as_ref().map_or(true, RawStats::is_empty);
        no_image && no_stats
    }
}

/// `GET /esp32/stats` response body
///
/// `water_ml` and `objects` are required; a payload without them is malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePayload {
    /// Sample volume in millilitres
    pub water_ml: f64,
    /// Objects detected in the current frame
    pub objects: f64,
    /// Precomputed plastic share, when the device reports one
    #[serde(default)]
    pub percent_plastic: Option<f64>,
    /// Reported density, when the device reports one
    #[serde(default)]
    pub density: Option<f64>,
}

impl From<&LivePayload> for RawStats {
    fn from(live: &LivePayload) -> Self {
        RawStats {
            percent_plastic: live.percent_plastic,
            percent_water: None,
            objects: Some(live.objects),
            count: None,
            water_ml: Some(live.water_ml),
            density: live.density,
        }
    }
}

/// Service response, tagged by the endpoint it came from
///
/// Transient: consumed by the normalizer right after a fetch, never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSample {
    /// Latest upload-and-analyze result
    Upload(UploadPayload),
    /// Current live-device counters
    Live(LivePayload),
}

impl RawSample {
    /// Mode whose poller produced this sample
    pub fn mode(&self) -> Mode {
        match self {
            RawSample::Upload(_) => Mode::Upload,
            RawSample::Live(_) => Mode::Live,
        }
    }

    /// Statistics block in the common loose shape
    pub fn stats(&self) -> RawStats {
        match self {
            RawSample::Upload(payload) => payload.stats.clone().unwrap_or_default(),
            RawSample::Live(payload) => RawStats::from(payload),
        }
    }

    /// Image path carried by the payload (upload results only)
    pub fn image_path(&self) -> Option<&str> {
        match self {
            RawSample::Upload(payload) => payload.image_url.as_deref().filter(|p| !p.is_empty()),
            RawSample::Live(_) => None,
        }
    }
}

/// Which normalization policy a statistics block falls under
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleShape {
    /// Plastic share given directly
    Percentage { percent_plastic: f64 },
    /// Particle count and sample volume given; shares are derived
    CountVolume { count: f64, volume: f64 },
    /// Neither; all shares default to zero
    Empty,
}

/// Canonical statistics triple (plus density) for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    /// Poller the sample came from
    pub source: Mode,
    /// Detected particles
    pub particle_count: u64,
    /// Water share, 0-100
    pub percent_water: f64,
    /// Plastic share, 0-100
    pub percent_plastic: f64,
    /// Particles per millilitre; `None` when neither reported nor derivable
    pub density: Option<f64>,
}

impl NormalizedSample {
    /// Good/Poor verdict against the standard threshold
    pub fn quality(&self) -> WaterQuality {
        if self.percent_plastic > POOR_QUALITY_THRESHOLD_PERCENT {
            WaterQuality::Poor
        } else {
            WaterQuality::Good
        }
    }
}

/// Keep only finite, non-negative values
fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

/// Decide the normalization policy for a statistics block
///
/// Priority: a usable `percent_plastic` wins; otherwise a particle count
/// (`objects`, else `count`) together with a volume (`water_ml`); otherwise
/// the block is empty.
pub fn classify_raw_sample(raw: &RawStats) -> SampleShape {
    if let Some(percent_plastic) = raw.percent_plastic.filter(|v| v.is_finite()) {
        return SampleShape::Percentage {
            percent_plastic: clamp_percent(percent_plastic),
        };
    }

    let count = usable(raw.objects).or_else(|| usable(raw.count));
    match (count, usable(raw.water_ml)) {
        (Some(count), Some(volume)) => SampleShape::CountVolume { count, volume },
        _ => SampleShape::Empty,
    }
}

/// Convert a loose statistics block into a [`NormalizedSample`]
///
/// Pure and deterministic. `percent_water + percent_plastic == 100` whenever
/// both come from the same non-zero total; a zero total or an empty block
/// yields 0 for both.
pub fn normalize(raw: &RawStats, source: Mode) -> NormalizedSample {
    let shape = classify_raw_sample(raw);

    let (percent_plastic, percent_water) = match shape {
        SampleShape::Percentage { percent_plastic } => (percent_plastic, 100.0 - percent_plastic),
        SampleShape::CountVolume { count, volume } => {
            let total = count + volume;
            if total > 0.0 {
                let plastic = clamp_percent(count / total * 100.0);
                (plastic, 100.0 - plastic)
            } else {
                (0.0, 0.0)
            }
        }
        SampleShape::Empty => (0.0, 0.0),
    };

    let particle_count = usable(raw.objects)
        .or_else(|| usable(raw.count))
        .map(|c| c.round() as u64)
        .unwrap_or(0);

    let density = usable(raw.density).or_else(|| {
        (particle_count > 0).then(|| particle_count as f64 / DENSITY_FALLBACK_DIVISOR)
    });

    trace!(
        source = %source,
        ?shape,
        particle_count,
        percent_plastic,
        "Normalized sample"
    );

    NormalizedSample {
        source,
        particle_count,
        percent_water,
        percent_plastic,
        density,
    }
}
