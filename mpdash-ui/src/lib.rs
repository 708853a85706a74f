//! # mpdash Dashboard Core (mpdash-ui)
//!
//! Dual-mode polling core for the microplastic monitoring dashboard.
//!
//! **Purpose:** Poll the detection service for the latest upload result and
//! the live device stats, keep one snapshot per mode, raise audible alerts on
//! poor water quality, and submit staged sample images.
//!
//! **Architecture:** Two independent tokio interval pollers feeding
//! sequence-guarded snapshot slots, coordinated by [`Dashboard`]

pub mod alert;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod poller;
pub mod staged;
pub mod state;

pub use alert::{SilentSink, TerminalBell, ToneSink};
pub use client::{DetectionService, HttpDetectionClient};
pub use coordinator::{Dashboard, DashboardView, SubmitOutcome};
pub use error::{Error, Result};
pub use poller::TickOutcome;
pub use staged::StagedFile;
pub use state::{SharedState, SlotHealth};
