//! Dashboard state coordinator
//!
//! Owns the two pollers, the shared state and the alert dispatcher, and is the
//! only entry point the presentation layer uses: `select_mode`, `select_file`,
//! `submit`, and the read-only [`DashboardView`].

use mpdash_common::config::DashboardConfig;
use mpdash_common::events::{DashboardEvent, EventBus};
use mpdash_common::time::MonotonicClock;
use mpdash_common::{DisplaySnapshot, Mode};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alert::{AlertDebouncer, AlertDispatcher, AlertState, ChimePlayer, ToneSink};
use crate::client::DetectionService;
use crate::error::{Error, Result};
use crate::poller::{spawn_poller, PollContext, TickOutcome};
use crate::staged::StagedFile;
use crate::state::{SharedState, SlotHealth, Staging};

/// Outcome of a `submit()` call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The service accepted the staged file
    Submitted,
    /// Nothing was staged; no request sent
    NothingStaged,
    /// Another submission is in flight; no request sent
    AlreadySubmitting,
}

/// Read model for the presentation layer
#[derive(Debug, Clone)]
pub struct DashboardView {
    /// Selected mode
    pub mode: Mode,
    /// Snapshot for the selected mode, if one is held and visible
    pub snapshot: Option<Arc<DisplaySnapshot>>,
    /// A submission is in flight
    pub is_submitting: bool,
    /// Name of the staged file, if any
    pub staged_file: Option<String>,
}

/// Releases the submission flag however `submit()` exits
struct SubmitGuard<'a>(&'a SharedState);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.end_submit();
    }
}

/// The running dashboard
///
/// Both pollers start in [`Dashboard::start`] and run until
/// [`Dashboard::shutdown`] (or drop); mode switches never stop them.
pub struct Dashboard {
    state: Arc<SharedState>,
    service: Arc<dyn DetectionService>,
    alerts: Arc<AlertDispatcher>,
    poll_ctx: Arc<PollContext>,
    shutdown: CancellationToken,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dashboard {
    /// Build the shared state and start both pollers
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &DashboardConfig,
        initial_mode: Mode,
        service: Arc<dyn DetectionService>,
        sink: Arc<dyn ToneSink>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        let state = Arc::new(SharedState::new(initial_mode, events.clone()));

        let alerts = Arc::new(AlertDispatcher::new(
            AlertDebouncer::new(config.alert_threshold_percent, config.alert_cooldown()),
            ChimePlayer::new(sink, config.chimes_per_burst, config.chime_gap()),
            events,
        ));

        let shutdown = CancellationToken::new();
        let poll_ctx = Arc::new(PollContext {
            state: Arc::clone(&state),
            service: Arc::clone(&service),
            alerts: alerts.clone(),
            shutdown: shutdown.clone(),
            clock: MonotonicClock::new(),
        });

        let pollers = vec![
            spawn_poller(
                Arc::clone(&poll_ctx),
                Mode::Upload,
                config.upload_poll_interval(),
            ),
            spawn_poller(Arc::clone(&poll_ctx), Mode::Live, config.live_poll_interval()),
        ];

        info!(
            mode = %initial_mode,
            service_url = %service.base_url(),
            upload_poll_ms = config.upload_poll_ms,
            live_poll_ms = config.live_poll_ms,
            "Dashboard started"
        );

        Self {
            state,
            service,
            alerts,
            poll_ctx,
            shutdown,
            pollers: Mutex::new(pollers),
        }
    }

    /// Switch the selected mode
    ///
    /// Switching to live ends the staging cycle: the staged file is dropped
    /// and the upload snapshot is no longer hidden. Snapshot slots are never
    /// touched.
    pub async fn select_mode(&self, mode: Mode) {
        let mut current = self.state.mode.write().await;
        let old_mode = *current;
        if old_mode == mode {
            return;
        }

        *current = mode;
        if mode == Mode::Live {
            *self.state.staging.write().await = Staging::default();
        }
        drop(current);

        info!(old_mode = %old_mode, new_mode = %mode, "Mode changed");
        self.state.events.emit_lossy(DashboardEvent::ModeChanged {
            old_mode,
            new_mode: mode,
            timestamp: self.poll_ctx.clock.now(),
        });
    }

    /// Stage a file for submission
    ///
    /// Replaces any previously staged file and hides the upload snapshot
    /// until a result requested after the next successful submission arrives.
    /// Only available in upload mode.
    pub async fn select_file(&self, file: StagedFile) -> Result<()> {
        let mode = self.state.mode.read().await;
        if *mode != Mode::Upload {
            return Err(Error::InvalidInput(
                "Files can only be staged in upload mode".to_string(),
            ));
        }

        let file_id = file.id;
        let file_name = file.name.clone();
        if !file.is_image() {
            warn!(
                file_name = %file_name,
                content_type = %file.content_type,
                "Staged file does not look like an image"
            );
        }

        {
            let mut staging = self.state.staging.write().await;
            staging.file = Some(file);
            staging.hide_upload_before = Some(u64::MAX);
        }
        drop(mode);

        info!(file_id = %file_id, file_name = %file_name, "File staged");
        self.state.events.emit_lossy(DashboardEvent::FileStaged {
            file_id,
            file_name,
            timestamp: self.poll_ctx.clock.now(),
        });
        Ok(())
    }

    /// Send the staged file to the detection service
    ///
    /// No request is made when nothing is staged or a submission is already
    /// in flight. On success the file is unstaged; the detection result shows
    /// up through a later upload tick. On failure the file stays staged and
    /// the transport error is returned.
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        if !self.state.try_begin_submit() {
            return Ok(SubmitOutcome::AlreadySubmitting);
        }
        let _guard = SubmitGuard(&self.state);

        let file = match self.state.staging.read().await.file.clone() {
            Some(file) => file,
            None => return Ok(SubmitOutcome::NothingStaged),
        };

        info!(
            file_id = %file.id,
            file_name = %file.name,
            bytes = file.len(),
            "Submitting sample"
        );
        self.state.events.emit_lossy(DashboardEvent::SubmissionStarted {
            file_id: file.id,
            file_name: file.name.clone(),
            timestamp: self.poll_ctx.clock.now(),
        });

        match self.service.submit_sample(&file).await {
            Ok(()) => {
                {
                    let mut staging = self.state.staging.write().await;
                    if staging.file.as_ref().map(|f| f.id) == Some(file.id) {
                        staging.file = None;
                        staging.hide_upload_before =
                            Some(self.state.peek_next_sequence(Mode::Upload));
                    }
                }

                info!(file_id = %file.id, file_name = %file.name, "Sample submitted");
                self.state.events.emit_lossy(DashboardEvent::SubmissionSucceeded {
                    file_id: file.id,
                    file_name: file.name,
                    timestamp: self.poll_ctx.clock.now(),
                });
                Ok(SubmitOutcome::Submitted)
            }
            Err(e) => {
                warn!(
                    file_id = %file.id,
                    file_name = %file.name,
                    error = %e,
                    "Submission failed, file stays staged"
                );
                self.state.events.emit_lossy(DashboardEvent::SubmissionFailed {
                    file_id: file.id,
                    file_name: file.name,
                    error: e.to_string(),
                    timestamp: self.poll_ctx.clock.now(),
                });
                Err(e)
            }
        }
    }

    /// Current read model: the selected mode's visible snapshot and flags
    pub async fn view(&self) -> DashboardView {
        let mode = self.state.get_mode().await;
        let held = self.state.snapshot(mode).await;
        let visible = match &held {
            Some(snapshot) => self.state.is_visible(snapshot).await,
            None => false,
        };
        let snapshot = if visible { held } else { None };
        let staged_file = self
            .state
            .staging
            .read()
            .await
            .file
            .as_ref()
            .map(|f| f.name.clone());

        DashboardView {
            mode,
            snapshot,
            is_submitting: self.state.is_submitting(),
            staged_file,
        }
    }

    pub async fn mode(&self) -> Mode {
        self.state.get_mode().await
    }

    /// Snapshot held in a slot, regardless of visibility
    pub async fn snapshot(&self, mode: Mode) -> Option<Arc<DisplaySnapshot>> {
        self.state.snapshot(mode).await
    }

    pub async fn health(&self, mode: Mode) -> SlotHealth {
        self.state.health(mode).await
    }

    pub async fn alert_state(&self, mode: Mode) -> AlertState {
        self.alerts.state(mode).await
    }

    pub fn is_submitting(&self) -> bool {
        self.state.is_submitting()
    }

    /// Run one tick for `mode` now, outside the schedule
    pub async fn refresh(&self, mode: Mode) -> TickOutcome {
        self.poll_ctx.tick(mode).await
    }

    /// Subscribe to dashboard events
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.state.events.subscribe()
    }

    /// Stop both pollers and wait for their loops to exit
    ///
    /// Fetches still in flight complete and their results are dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<_> = self.pollers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Poller task ended abnormally: {}", e);
            }
        }
        info!("Dashboard stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
