//! Dashboard integration tests
//!
//! Drive the coordinator, both pollers and the alert path against an
//! in-memory detection service. Most tests use very long poll intervals and
//! trigger ticks with `Dashboard::refresh`; the liveness tests run the real
//! schedule on paused time.

mod helpers;

use helpers::{
    live_percent, live_sample, manual_config, png_file, upload_result, upload_sample,
    CountingSink, FakeService, Reply,
};
use mpdash_common::config::DashboardConfig;
use mpdash_common::events::DashboardEvent;
use mpdash_common::{Mode, WaterQuality};
use mpdash_ui::{Dashboard, SubmitOutcome, TickOutcome};
use std::sync::Arc;
use std::time::Duration;

fn start(mode: Mode) -> (Dashboard, Arc<FakeService>, Arc<CountingSink>) {
    start_with(&manual_config(), mode)
}

fn start_with(
    config: &DashboardConfig,
    mode: Mode,
) -> (Dashboard, Arc<FakeService>, Arc<CountingSink>) {
    let service = Arc::new(FakeService::new());
    let sink = Arc::new(CountingSink::default());
    let dashboard = Dashboard::start(config, mode, service.clone(), sink.clone());
    (dashboard, service, sink)
}

// ================================================================================================
// End-to-end
// ================================================================================================

#[tokio::test(start_paused = true)]
async fn test_poor_upload_result_is_normalized_and_alerts_once() {
    let (dashboard, service, sink) = start(Mode::Upload);
    service.set_upload(Reply::Ok(Some(upload_sample(15.0, 20.0))));

    let outcome = dashboard.refresh(Mode::Upload).await;
    assert_eq!(
        outcome,
        TickOutcome::Published {
            sequence: 1,
            alerted: true
        }
    );

    let view = dashboard.view().await;
    assert_eq!(view.mode, Mode::Upload);
    let snapshot = view.snapshot.expect("upload snapshot should be visible");
    assert_eq!(
        snapshot.image_url.as_deref(),
        Some("http://detector.test:8000/image/annotated_sample.jpg")
    );
    let stats = snapshot.stats.expect("stats");
    assert_eq!(stats.particle_count, 20);
    assert_eq!(stats.percent_plastic, 15.0);
    assert_eq!(stats.percent_water, 85.0);
    assert_eq!(stats.quality(), WaterQuality::Poor);

    // Let the burst finish: two chimes, 500ms apart
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.count(), 2);

    // Same reading again within the cooldown: no second burst
    let outcome = dashboard.refresh(Mode::Upload).await;
    assert_eq!(
        outcome,
        TickOutcome::Published {
            sequence: 2,
            alerted: false
        }
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.count(), 2);

    dashboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_upload_result_alerts_once() {
    let config = DashboardConfig {
        upload_poll_ms: 100,
        live_poll_ms: 3_600_000,
        alert_cooldown_ms: 300,
        chime_gap_ms: 10,
        ..DashboardConfig::default()
    };
    let (dashboard, service, sink) = start_with(&config, Mode::Live);
    service.set_upload(Reply::Ok(Some(upload_sample(15.0, 20.0))));

    // Fifteen polls return the same stored result, several cooldowns apart
    tokio::time::sleep(Duration::from_millis(1_550)).await;
    assert!(service.upload_calls() >= 10);
    assert_eq!(sink.count(), 2);

    // A newly processed sample is a new reading; the cooldown has long passed
    service.set_upload(Reply::Ok(Some(upload_result(
        "/image/annotated_second.jpg",
        15.0,
        20.0,
    ))));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(sink.count(), 4);
    assert_eq!(
        dashboard.snapshot(Mode::Upload).await.unwrap().image_url.as_deref(),
        Some("http://detector.test:8000/image/annotated_second.jpg")
    );

    dashboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sustained_live_reading_refires_after_cooldown() {
    let config = DashboardConfig {
        upload_poll_ms: 3_600_000,
        live_poll_ms: 1_000,
        alert_cooldown_ms: 2_500,
        chime_gap_ms: 10,
        ..DashboardConfig::default()
    };
    let (dashboard, service, sink) = start_with(&config, Mode::Live);
    service.set_live(Reply::Ok(live_percent(50.0)));

    // Ticks at 1s, 2s, 3s, 4s: fires at 1s, suppressed until the cooldown ends
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(service.live_calls(), 3);
    assert_eq!(sink.count(), 2);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(service.live_calls(), 4);
    assert_eq!(sink.count(), 4);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_good_quality_never_alerts() {
    let (dashboard, service, sink) = start(Mode::Live);
    service.set_live(Reply::Ok(live_sample(95.0, 5.0)));

    for _ in 0..3 {
        assert!(matches!(
            dashboard.refresh(Mode::Live).await,
            TickOutcome::Published { alerted: false, .. }
        ));
    }

    let stats = dashboard.view().await.snapshot.unwrap().stats.unwrap();
    assert_eq!(stats.particle_count, 5);
    assert!((stats.percent_plastic - 5.0).abs() < 1e-9);
    assert_eq!(sink.count(), 0);

    dashboard.shutdown().await;
}

// ================================================================================================
// Mode isolation and visibility
// ================================================================================================

#[tokio::test]
async fn test_mode_switch_keeps_both_slots() {
    let (dashboard, service, _sink) = start(Mode::Upload);
    service.set_upload(Reply::Ok(Some(upload_sample(4.0, 8.0))));
    service.set_live(Reply::Ok(live_percent(2.0)));

    dashboard.refresh(Mode::Upload).await;
    dashboard.refresh(Mode::Live).await;

    let before = dashboard.view().await.snapshot.unwrap();
    assert_eq!(before.mode, Mode::Upload);

    dashboard.select_mode(Mode::Live).await;
    let view = dashboard.view().await;
    let live = view.snapshot.unwrap();
    assert_eq!(live.mode, Mode::Live);
    assert_eq!(
        live.image_url.as_deref(),
        Some("http://detector.test:8000/esp32/video_feed")
    );
    assert!(dashboard.snapshot(Mode::Upload).await.is_some());

    dashboard.select_mode(Mode::Upload).await;
    let after = dashboard.view().await.snapshot.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(*before, *after);
    assert_eq!(after.stats.unwrap().percent_plastic, 4.0);
    assert!(Arc::ptr_eq(
        &live,
        &dashboard.snapshot(Mode::Live).await.unwrap()
    ));

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_events_carry_visibility() {
    let (dashboard, service, _sink) = start(Mode::Upload);
    service.set_live(Reply::Ok(live_percent(3.0)));
    let mut events = dashboard.subscribe();

    dashboard.refresh(Mode::Live).await;
    match events.recv().await.unwrap() {
        DashboardEvent::SnapshotUpdated { snapshot, visible } => {
            assert_eq!(snapshot.mode, Mode::Live);
            assert!(!visible);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    dashboard.select_mode(Mode::Live).await;
    assert_eq!(events.recv().await.unwrap().event_type(), "mode_changed");

    dashboard.refresh(Mode::Live).await;
    match events.recv().await.unwrap() {
        DashboardEvent::SnapshotUpdated { visible, .. } => assert!(visible),
        other => panic!("unexpected event: {:?}", other),
    }

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_no_result_yet_leaves_slot_empty() {
    let (dashboard, _service, _sink) = start(Mode::Upload);

    assert_eq!(
        dashboard.refresh(Mode::Upload).await,
        TickOutcome::NoResult { sequence: 1 }
    );
    assert!(dashboard.view().await.snapshot.is_none());
    assert_eq!(dashboard.health(Mode::Upload).await.total_failures, 0);

    dashboard.shutdown().await;
}

// ================================================================================================
// Polling liveness
// ================================================================================================

#[tokio::test(start_paused = true)]
async fn test_both_pollers_run_regardless_of_mode() {
    let config = DashboardConfig::default();
    let (dashboard, service, _sink) = start_with(&config, Mode::Live);
    service.set_upload(Reply::Ok(Some(upload_sample(1.0, 2.0))));

    tokio::time::sleep(Duration::from_millis(4_500)).await;

    // Upload ticks at 2s and 4s, live ticks every second
    assert!(service.upload_calls() >= 2, "upload calls: {}", service.upload_calls());
    assert!(service.live_calls() >= 4, "live calls: {}", service.live_calls());

    // The hidden slot kept refreshing while live was selected
    assert_eq!(dashboard.view().await.mode, Mode::Live);
    assert!(dashboard.snapshot(Mode::Upload).await.is_some());

    dashboard.select_mode(Mode::Upload).await;
    assert!(dashboard.view().await.snapshot.is_some());

    dashboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_tick_does_not_delay_schedule() {
    let config = DashboardConfig::default();
    let (dashboard, service, _sink) = start_with(&config, Mode::Live);
    // First live fetch hangs for 3.5 periods
    service.push_live(Duration::from_millis(3_500), Reply::Ok(live_percent(1.0)));

    tokio::time::sleep(Duration::from_millis(3_200)).await;
    assert!(service.live_calls() >= 3, "live calls: {}", service.live_calls());

    dashboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_pollers_and_discards_inflight() {
    let (dashboard, service, _sink) = start(Mode::Live);
    service.push_live(Duration::from_secs(1), Reply::Ok(live_percent(50.0)));

    let (outcome, _) = tokio::join!(dashboard.refresh(Mode::Live), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        dashboard.shutdown().await;
    });

    assert_eq!(outcome, TickOutcome::Cancelled { sequence: 1 });
    assert!(dashboard.snapshot(Mode::Live).await.is_none());
    assert!(dashboard.is_shut_down());

    let calls = service.live_calls();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.live_calls(), calls);
}

// ================================================================================================
// Failures and ordering
// ================================================================================================

#[tokio::test]
async fn test_failed_tick_keeps_previous_snapshot() {
    let (dashboard, service, sink) = start(Mode::Live);
    service.push_live(Duration::ZERO, Reply::Ok(live_percent(6.0)));
    service.push_live(Duration::ZERO, Reply::fail("connection refused"));
    service.push_live(Duration::ZERO, Reply::fail("connection refused"));
    service.set_live(Reply::Ok(live_percent(7.0)));

    assert!(matches!(
        dashboard.refresh(Mode::Live).await,
        TickOutcome::Published { sequence: 1, .. }
    ));
    assert_eq!(
        dashboard.refresh(Mode::Live).await,
        TickOutcome::Failed { sequence: 2 }
    );
    assert_eq!(
        dashboard.refresh(Mode::Live).await,
        TickOutcome::Failed { sequence: 3 }
    );

    let held = dashboard.view().await.snapshot.unwrap();
    assert_eq!(held.sequence, 1);

    let health = dashboard.health(Mode::Live).await;
    assert_eq!(health.consecutive_failures, 2);
    assert_eq!(health.total_ticks, 3);
    assert!(health
        .last_error
        .as_deref()
        .unwrap()
        .contains("connection refused"));

    dashboard.refresh(Mode::Live).await;
    let health = dashboard.health(Mode::Live).await;
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.total_failures, 2);
    assert_eq!(dashboard.view().await.snapshot.unwrap().sequence, 4);
    assert_eq!(sink.count(), 0);

    dashboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_late_result_from_older_tick_is_discarded() {
    let (dashboard, service, sink) = start(Mode::Live);
    // Tick 1 is slow and poor; tick 2 is fast and good
    service.push_live(Duration::from_millis(500), Reply::Ok(live_percent(50.0)));
    service.push_live(Duration::ZERO, Reply::Ok(live_percent(1.0)));

    let (first, second) = tokio::join!(dashboard.refresh(Mode::Live), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        dashboard.refresh(Mode::Live).await
    });

    assert!(matches!(second, TickOutcome::Published { sequence: 2, .. }));
    assert_eq!(
        first,
        TickOutcome::Stale {
            sequence: 1,
            latest_sequence: 2
        }
    );

    let held = dashboard.view().await.snapshot.unwrap();
    assert_eq!(held.sequence, 2);
    assert_eq!(held.stats.unwrap().percent_plastic, 1.0);
    assert_eq!(dashboard.health(Mode::Live).await.stale_discards, 1);

    // Discarded results never alert
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sink.count(), 0);

    dashboard.shutdown().await;
}

// ================================================================================================
// Staging and submission
// ================================================================================================

#[tokio::test]
async fn test_failed_submission_keeps_file_for_retry() {
    let (dashboard, service, _sink) = start(Mode::Upload);
    service.push_submit(Duration::ZERO, Reply::fail("503 Service Unavailable"));

    dashboard.select_file(png_file("river.png")).await.unwrap();

    let err = dashboard.submit().await.unwrap_err();
    assert!(err.is_transport());
    let view = dashboard.view().await;
    assert_eq!(view.staged_file.as_deref(), Some("river.png"));
    assert!(!view.is_submitting);

    assert_eq!(dashboard.submit().await.unwrap(), SubmitOutcome::Submitted);
    assert!(dashboard.view().await.staged_file.is_none());
    assert_eq!(service.submit_calls(), 2);
    assert_eq!(service.submitted(), vec!["river.png".to_string()]);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_submit_without_file_is_noop() {
    let (dashboard, service, _sink) = start(Mode::Upload);

    assert_eq!(dashboard.submit().await.unwrap(), SubmitOutcome::NothingStaged);
    assert_eq!(service.submit_calls(), 0);
    assert!(!dashboard.is_submitting());

    dashboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submit_is_rejected() {
    let (dashboard, service, _sink) = start(Mode::Upload);
    service.push_submit(Duration::from_millis(200), Reply::Ok(()));
    dashboard.select_file(png_file("lake.png")).await.unwrap();

    let (first, second) = tokio::join!(dashboard.submit(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dashboard.is_submitting());
        dashboard.submit().await
    });

    assert_eq!(first.unwrap(), SubmitOutcome::Submitted);
    assert_eq!(second.unwrap(), SubmitOutcome::AlreadySubmitting);
    assert_eq!(service.submit_calls(), 1);
    assert!(!dashboard.is_submitting());

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_staging_hides_upload_result_until_new_one_arrives() {
    let (dashboard, service, _sink) = start(Mode::Upload);
    service.set_upload(Reply::Ok(Some(upload_sample(3.0, 6.0))));

    dashboard.refresh(Mode::Upload).await;
    assert!(dashboard.view().await.snapshot.is_some());

    dashboard.select_file(png_file("pond.png")).await.unwrap();
    assert!(dashboard.view().await.snapshot.is_none());
    // The slot itself is untouched
    assert_eq!(dashboard.snapshot(Mode::Upload).await.unwrap().sequence, 1);

    // Results arriving before a submission stay hidden
    dashboard.refresh(Mode::Upload).await;
    assert!(dashboard.view().await.snapshot.is_none());

    dashboard.submit().await.unwrap();
    service.set_upload(Reply::Ok(Some(upload_sample(12.0, 24.0))));
    dashboard.refresh(Mode::Upload).await;

    let shown = dashboard.view().await.snapshot.unwrap();
    assert_eq!(shown.sequence, 3);
    assert_eq!(shown.stats.unwrap().percent_plastic, 12.0);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_switching_to_live_clears_staging() {
    let (dashboard, service, _sink) = start(Mode::Upload);
    service.set_upload(Reply::Ok(Some(upload_sample(3.0, 6.0))));
    dashboard.refresh(Mode::Upload).await;

    dashboard.select_file(png_file("tap.png")).await.unwrap();
    dashboard.select_mode(Mode::Live).await;
    dashboard.select_mode(Mode::Upload).await;

    let view = dashboard.view().await;
    assert!(view.staged_file.is_none());
    assert_eq!(view.snapshot.unwrap().sequence, 1);
    assert_eq!(dashboard.submit().await.unwrap(), SubmitOutcome::NothingStaged);

    dashboard.shutdown().await;
}

#[tokio::test]
async fn test_select_file_rejected_in_live_mode() {
    let (dashboard, _service, _sink) = start(Mode::Live);

    let result = dashboard.select_file(png_file("sea.png")).await;
    assert!(matches!(result, Err(mpdash_ui::Error::InvalidInput(_))));
    assert!(dashboard.view().await.staged_file.is_none());

    dashboard.shutdown().await;
}
