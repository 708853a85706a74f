//! # mpdash Common Library
//!
//! Shared vocabulary for the microplastic monitoring dashboard:
//! - Operating modes and display snapshots
//! - Raw detection-service payloads and the stat normalizer
//! - Event types (DashboardEvent enum) and the EventBus
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sample;
pub mod snapshot;
pub mod time;

pub use error::{Error, Result};
pub use sample::{classify_raw_sample, normalize, NormalizedSample, RawSample, RawStats, SampleShape};
pub use snapshot::{DisplaySnapshot, Mode, StatsSummary, WaterQuality};
