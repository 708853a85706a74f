//! Test helpers for mpdash-ui integration tests
//!
//! - FakeService: scripted in-memory DetectionService with call counters
//! - CountingSink: ToneSink that counts tones
//! - Sample and config builders

#![allow(dead_code)]

use async_trait::async_trait;
use mpdash_common::config::DashboardConfig;
use mpdash_common::sample::{LivePayload, RawStats, UploadPayload};
use mpdash_common::RawSample;
use mpdash_ui::{DetectionService, Error, Result, StagedFile, ToneSink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const FAKE_BASE_URL: &str = "http://detector.test:8000";

/// Scripted reply for one call
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    /// Transport failure with this message
    Fail(String),
}

impl<T> Reply<T> {
    pub fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }
}

/// Queued replies, then a fallback once the queue is drained
struct Script<T> {
    queue: VecDeque<(Duration, Reply<T>)>,
    fallback: Reply<T>,
}

impl<T: Clone> Script<T> {
    fn new(fallback: Reply<T>) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> (Duration, Reply<T>) {
        self.queue
            .pop_front()
            .unwrap_or_else(|| (Duration::ZERO, self.fallback.clone()))
    }
}

async fn play<T>(delay: Duration, reply: Reply<T>) -> Result<T> {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    match reply {
        Reply::Ok(value) => Ok(value),
        Reply::Fail(message) => Err(Error::Transport(message)),
    }
}

/// In-memory detection service
///
/// Defaults: no upload result yet, an empty live reading, submissions
/// accepted.
pub struct FakeService {
    upload: Mutex<Script<Option<RawSample>>>,
    live: Mutex<Script<RawSample>>,
    submit: Mutex<Script<()>>,
    submitted: Mutex<Vec<String>>,
    pub upload_calls: AtomicUsize,
    pub live_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            upload: Mutex::new(Script::new(Reply::Ok(None))),
            live: Mutex::new(Script::new(Reply::Ok(live_sample(100.0, 0.0)))),
            submit: Mutex::new(Script::new(Reply::Ok(()))),
            submitted: Mutex::new(Vec::new()),
            upload_calls: AtomicUsize::new(0),
            live_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    /// Reply used for every upload fetch once the queue is empty
    pub fn set_upload(&self, reply: Reply<Option<RawSample>>) {
        self.upload.lock().unwrap().fallback = reply;
    }

    /// Queue a one-off upload reply, delivered after `delay`
    pub fn push_upload(&self, delay: Duration, reply: Reply<Option<RawSample>>) {
        self.upload.lock().unwrap().queue.push_back((delay, reply));
    }

    pub fn set_live(&self, reply: Reply<RawSample>) {
        self.live.lock().unwrap().fallback = reply;
    }

    pub fn push_live(&self, delay: Duration, reply: Reply<RawSample>) {
        self.live.lock().unwrap().queue.push_back((delay, reply));
    }

    pub fn push_submit(&self, delay: Duration, reply: Reply<()>) {
        self.submit.lock().unwrap().queue.push_back((delay, reply));
    }

    /// Names of files the service accepted
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionService for FakeService {
    async fn submit_sample(&self, file: &StagedFile) -> Result<()> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, reply) = self.submit.lock().unwrap().next();
        play(delay, reply).await?;
        self.submitted.lock().unwrap().push(file.name.clone());
        Ok(())
    }

    async fn fetch_latest_upload(&self) -> Result<Option<RawSample>> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, reply) = self.upload.lock().unwrap().next();
        play(delay, reply).await
    }

    async fn fetch_live_stats(&self) -> Result<RawSample> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, reply) = self.live.lock().unwrap().next();
        play(delay, reply).await
    }

    fn base_url(&self) -> &str {
        FAKE_BASE_URL
    }
}

/// ToneSink that only counts
#[derive(Default)]
pub struct CountingSink {
    tones: AtomicUsize,
}

impl CountingSink {
    pub fn count(&self) -> usize {
        self.tones.load(Ordering::SeqCst)
    }
}

impl ToneSink for CountingSink {
    fn play_tone(&self) -> Result<()> {
        self.tones.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Upload result with a precomputed plastic share and a particle count
pub fn upload_sample(percent_plastic: f64, count: f64) -> RawSample {
    upload_result("/image/annotated_sample.jpg", percent_plastic, count)
}

/// Upload result for a specific processed image
pub fn upload_result(image_url: &str, percent_plastic: f64, count: f64) -> RawSample {
    RawSample::Upload(UploadPayload {
        image_url: Some(image_url.to_string()),
        stats: Some(RawStats {
            percent_plastic: Some(percent_plastic),
            count: Some(count),
            ..RawStats::default()
        }),
    })
}

/// Live reading from counters
pub fn live_sample(water_ml: f64, objects: f64) -> RawSample {
    RawSample::Live(LivePayload {
        water_ml,
        objects,
        percent_plastic: None,
        density: None,
    })
}

/// Live reading with a precomputed plastic share
pub fn live_percent(percent_plastic: f64) -> RawSample {
    RawSample::Live(LivePayload {
        water_ml: 100.0 - percent_plastic,
        objects: percent_plastic,
        percent_plastic: Some(percent_plastic),
        density: None,
    })
}

/// Config whose pollers never tick on their own during a test
pub fn manual_config() -> DashboardConfig {
    DashboardConfig {
        upload_poll_ms: 3_600_000,
        live_poll_ms: 3_600_000,
        ..DashboardConfig::default()
    }
}

/// Smallest PNG header; enough for content sniffing
pub fn png_file(name: &str) -> StagedFile {
    StagedFile::from_bytes(
        name,
        vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52,
        ],
    )
}
