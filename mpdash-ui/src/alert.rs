//! Poor-quality alerts
//!
//! [`AlertDebouncer`] decides from the stream of normalized samples when an
//! alert burst fires; [`ChimePlayer`] plays one burst on an injected
//! [`ToneSink`]. Playback failures are logged and dropped, never retried.
//!
//! Debounce rule, per polling source (upload and live are independent):
//! fire when `percent_plastic > threshold` AND either the previous sample from
//! that source was at or below the threshold (a fresh crossing), or no burst
//! has fired for that source within the cooldown window.

use async_trait::async_trait;
use mpdash_common::events::{DashboardEvent, EventBus};
use mpdash_common::time::{elapsed_between, Timestamp};
use mpdash_common::{Mode, NormalizedSample};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Outcome of feeding one sample to the debouncer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDecision {
    pub fire: bool,
}

/// Per-source debounce bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertState {
    /// When this source last fired a burst
    pub last_fired_at: Option<Timestamp>,
    /// Plastic share of the previous sample from this source
    pub last_percent_plastic: Option<f64>,
}

/// Threshold-crossing debouncer with independent state per source
#[derive(Debug)]
pub struct AlertDebouncer {
    threshold: f64,
    cooldown: Duration,
    states: HashMap<Mode, AlertState>,
}

impl AlertDebouncer {
    pub fn new(threshold: f64, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            states: HashMap::new(),
        }
    }

    /// Feed one sample; decides whether a burst fires for its source
    pub fn consider(&mut self, sample: &NormalizedSample, now: Timestamp) -> AlertDecision {
        let threshold = self.threshold;
        let state = self.states.entry(sample.source).or_default();

        let above = sample.percent_plastic > threshold;
        let was_above = state
            .last_percent_plastic
            .map_or(false, |previous| previous > threshold);
        let cooled_down = state
            .last_fired_at
            .map_or(true, |fired| elapsed_between(fired, now) >= self.cooldown);

        let fire = above && (!was_above || cooled_down);

        state.last_percent_plastic = Some(sample.percent_plastic);
        if fire {
            state.last_fired_at = Some(now);
        }

        trace!(
            source = %sample.source,
            percent_plastic = sample.percent_plastic,
            was_above,
            cooled_down,
            fire,
            "Alert decision"
        );
        AlertDecision { fire }
    }

    /// Bookkeeping for one source (default when it never reported)
    pub fn state(&self, mode: Mode) -> AlertState {
        self.states.get(&mode).copied().unwrap_or_default()
    }
}

/// Audio collaborator: plays one short tone, fire-and-forget
pub trait ToneSink: Send + Sync {
    fn play_tone(&self) -> Result<()>;
}

/// Rings the terminal bell on stderr
#[derive(Debug, Default)]
pub struct TerminalBell;

impl ToneSink for TerminalBell {
    fn play_tone(&self) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| Error::AudioPlayback(e.to_string()))
    }
}

/// Audio disabled; tones are only traced
#[derive(Debug, Default)]
pub struct SilentSink;

impl ToneSink for SilentSink {
    fn play_tone(&self) -> Result<()> {
        trace!("Tone suppressed (silent sink)");
        Ok(())
    }
}

/// Plays alert bursts: `chimes` tones spaced `gap` apart
#[derive(Clone)]
pub struct ChimePlayer {
    sink: Arc<dyn ToneSink>,
    chimes: u32,
    gap: Duration,
}

impl ChimePlayer {
    pub fn new(sink: Arc<dyn ToneSink>, chimes: u32, gap: Duration) -> Self {
        Self { sink, chimes, gap }
    }

    /// Start one burst in the background
    ///
    /// The returned handle is only useful to tests; callers normally drop it.
    pub fn play_burst(&self) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let chimes = self.chimes;
        let gap = self.gap;

        tokio::spawn(async move {
            for chime in 0..chimes {
                if chime > 0 {
                    tokio::time::sleep(gap).await;
                }
                if let Err(e) = sink.play_tone() {
                    debug!("Chime {} not played: {}", chime + 1, e);
                }
            }
        })
    }
}

/// Something that reacts to normalized samples with alerts
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Returns true when a burst was started
    async fn consider(&self, sample: &NormalizedSample, now: Timestamp) -> bool;
}

/// Debouncer + chime player + event emission, shared by both pollers
pub struct AlertDispatcher {
    debouncer: Mutex<AlertDebouncer>,
    player: ChimePlayer,
    events: EventBus,
}

impl AlertDispatcher {
    pub fn new(debouncer: AlertDebouncer, player: ChimePlayer, events: EventBus) -> Self {
        Self {
            debouncer: Mutex::new(debouncer),
            player,
            events,
        }
    }

    /// Debounce bookkeeping for one source
    pub async fn state(&self, mode: Mode) -> AlertState {
        self.debouncer.lock().await.state(mode)
    }
}

#[async_trait]
impl AlertHandler for AlertDispatcher {
    async fn consider(&self, sample: &NormalizedSample, now: Timestamp) -> bool {
        let decision = self.debouncer.lock().await.consider(sample, now);
        if !decision.fire {
            return false;
        }

        warn!(
            mode = %sample.source,
            percent_plastic = sample.percent_plastic,
            "Poor water quality detected"
        );
        self.events.emit_lossy(DashboardEvent::AlertFired {
            mode: sample.source,
            percent_plastic: sample.percent_plastic,
            timestamp: now,
        });
        self.player.play_burst();
        true
    }
}

#[cfg(feature = "audio")]
pub use cpal_sink::CpalToneSink;

/// Sine-beep output through the default sound device
#[cfg(feature = "audio")]
mod cpal_sink {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, FromSample, SampleFormat, SizedSample, StreamConfig};

    const AMPLITUDE: f32 = 0.2;

    /// Plays a short sine tone on the default output device
    ///
    /// Each tone opens its own stream on a short-lived thread (cpal streams
    /// are not `Send`), so `play_tone` returns immediately.
    #[derive(Debug, Clone)]
    pub struct CpalToneSink {
        frequency_hz: f32,
        duration: Duration,
    }

    impl CpalToneSink {
        pub fn new(frequency_hz: f32, duration: Duration) -> Self {
            Self {
                frequency_hz,
                duration,
            }
        }
    }

    impl Default for CpalToneSink {
        fn default() -> Self {
            Self::new(880.0, Duration::from_millis(150))
        }
    }

    impl ToneSink for CpalToneSink {
        fn play_tone(&self) -> Result<()> {
            if cpal::default_host().default_output_device().is_none() {
                return Err(Error::AudioPlayback("No default output device found".to_string()));
            }

            let frequency_hz = self.frequency_hz;
            let duration = self.duration;
            std::thread::Builder::new()
                .name("mpdash-tone".to_string())
                .spawn(move || {
                    if let Err(e) = play_sine(frequency_hz, duration) {
                        debug!("Tone playback failed: {}", e);
                    }
                })
                .map_err(|e| Error::AudioPlayback(format!("Failed to spawn tone thread: {}", e)))?;
            Ok(())
        }
    }

    fn play_sine(frequency_hz: f32, duration: Duration) -> Result<()> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::AudioPlayback("No default output device found".to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioPlayback(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config = supported.config();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, frequency_hz)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, frequency_hz)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, frequency_hz)?,
            sample_format => {
                return Err(Error::AudioPlayback(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioPlayback(format!("Failed to start stream: {}", e)))?;
        std::thread::sleep(duration);
        Ok(())
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        frequency_hz: f32,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let step = frequency_hz / config.sample_rate.0 as f32;
        let mut phase = 0.0f32;

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let value = (phase * std::f32::consts::TAU).sin() * AMPLITUDE;
                        phase = (phase + step) % 1.0;
                        for sample in frame.iter_mut() {
                            *sample = T::from_sample(value);
                        }
                    }
                },
                |err| debug!("Tone stream error: {}", err),
                None,
            )
            .map_err(|e| Error::AudioPlayback(format!("Failed to build stream: {}", e)))
    }
}
