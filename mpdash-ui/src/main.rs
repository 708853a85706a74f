//! mpdash console dashboard - Main entry point
//!
//! Headless front end for the microplastic dashboard core: starts both
//! pollers, renders visible snapshots and alerts to the log, and reads
//! line commands from stdin.

use std::io::BufRead;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mpdash_common::config::ConfigResolver;
use mpdash_common::events::DashboardEvent;
use mpdash_common::{Mode, StatsSummary};
use mpdash_ui::{
    Dashboard, HttpDetectionClient, SilentSink, StagedFile, SubmitOutcome, ToneSink,
};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mpdash-ui
#[derive(Parser, Debug)]
#[command(name = "mpdash-ui")]
#[command(about = "Microplastic monitoring dashboard (console front end)")]
#[command(version)]
struct Args {
    /// Config file (default: MPDASH_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detection service base URL (overrides MPDASH_SERVICE_URL and config)
    #[arg(short, long)]
    service_url: Option<String>,

    /// Initially selected mode
    #[arg(short, long, default_value = "upload")]
    mode: Mode,

    /// Stage this file at startup (upload mode only)
    #[arg(long)]
    stage: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,

    /// Disable alert chimes
    #[arg(long)]
    mute: bool,
}

/// One stdin command
#[derive(Debug, PartialEq)]
enum Command {
    Mode(Mode),
    File(PathBuf),
    Submit,
    Refresh,
    Status,
    Quit,
    Help,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "upload" => Some(Command::Mode(Mode::Upload)),
            "live" => Some(Command::Mode(Mode::Live)),
            "file" if !rest.is_empty() => Some(Command::File(PathBuf::from(rest))),
            "submit" => Some(Command::Submit),
            "refresh" => Some(Command::Refresh),
            "status" => Some(Command::Status),
            "quit" | "exit" => Some(Command::Quit),
            "help" | "?" => Some(Command::Help),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let (config, config_source) = ConfigResolver::new()
        .with_config_path(args.config.clone())
        .with_service_url(args.service_url.clone())
        .resolve_with_source()
        .context("Failed to load configuration")?;

    // Initialize tracing
    let level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mpdash_ui={level},mpdash_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config_source.log();
    info!("Starting mpdash dashboard against {}", config.service_url);

    let client = HttpDetectionClient::new(&config.service_url, config.request_timeout())
        .context("Failed to create detection service client")?;

    let dashboard = Arc::new(Dashboard::start(
        &config,
        args.mode,
        Arc::new(client),
        tone_sink(args.mute),
    ));

    let presenter = tokio::spawn(present(dashboard.subscribe()));

    if let Some(path) = &args.stage {
        stage_file(&dashboard, path).await;
    }

    let lines = spawn_stdin_reader().context("Failed to start stdin reader")?;

    tokio::select! {
        _ = command_loop(&dashboard, lines) => {},
        _ = shutdown_signal() => {},
    }

    dashboard.shutdown().await;
    presenter.abort();

    info!("Dashboard shutdown complete");
    Ok(())
}

fn tone_sink(mute: bool) -> Arc<dyn ToneSink> {
    if mute {
        return Arc::new(SilentSink);
    }

    #[cfg(feature = "audio")]
    let sink: Arc<dyn ToneSink> = Arc::new(mpdash_ui::alert::CpalToneSink::default());
    #[cfg(not(feature = "audio"))]
    let sink: Arc<dyn ToneSink> = Arc::new(mpdash_ui::TerminalBell);

    sink
}

/// Forward stdin lines from a dedicated thread
///
/// A blocking read on the runtime's pool would hold up shutdown until the next
/// newline, so input lives on its own thread that is abandoned on exit.
fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}

/// Run commands until `quit` or end of input
async fn command_loop(dashboard: &Arc<Dashboard>, mut lines: mpsc::Receiver<String>) {
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }

        let Some(command) = Command::parse(&line) else {
            warn!("Unknown command: {} (try 'help')", line.trim());
            continue;
        };

        if handle_command(dashboard, command).await.is_break() {
            return;
        }
    }

    info!("Input closed");
}

/// Execute one command; `Break` ends the session
async fn handle_command(dashboard: &Arc<Dashboard>, command: Command) -> ControlFlow<()> {
    match command {
        Command::Mode(mode) => dashboard.select_mode(mode).await,
        Command::File(path) => stage_file(dashboard, &path).await,
        Command::Submit => {
            spawn_submit(dashboard);
        }
        Command::Refresh => {
            let mode = dashboard.mode().await;
            let outcome = dashboard.refresh(mode).await;
            debug!("Manual refresh: {:?}", outcome);
        }
        Command::Status => print_status(dashboard).await,
        Command::Help => {
            info!("Commands: upload | live | file <path> | submit | refresh | status | quit")
        }
        Command::Quit => {
            info!("Quit requested");
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

/// Submit in the background so the console stays responsive meanwhile
fn spawn_submit(dashboard: &Arc<Dashboard>) -> JoinHandle<mpdash_ui::Result<SubmitOutcome>> {
    let dashboard = Arc::clone(dashboard);
    tokio::spawn(async move {
        let result = dashboard.submit().await;
        match &result {
            Ok(SubmitOutcome::Submitted) => info!("Submitted; waiting for the next result"),
            Ok(SubmitOutcome::NothingStaged) => warn!("No file staged"),
            Ok(SubmitOutcome::AlreadySubmitting) => warn!("A submission is already in flight"),
            Err(e) => error!("Submission failed (file kept, retry with 'submit'): {}", e),
        }
        result
    })
}

async fn stage_file(dashboard: &Dashboard, path: &std::path::Path) {
    let file = match StagedFile::from_path(path).await {
        Ok(file) => file,
        Err(e) => {
            error!("Cannot stage {}: {}", path.display(), e);
            return;
        }
    };

    if let Err(e) = dashboard.select_file(file).await {
        error!("Cannot stage {}: {}", path.display(), e);
    }
}

async fn print_status(dashboard: &Dashboard) {
    let view = dashboard.view().await;
    info!(
        "Mode: {} | submitting: {} | staged: {}",
        view.mode,
        view.is_submitting,
        view.staged_file.as_deref().unwrap_or("none")
    );

    match view.snapshot.as_ref().and_then(|s| s.stats.as_ref()) {
        Some(stats) => info!("Current: {}", StatsSummary(stats)),
        None => info!("Current: no data"),
    }

    for mode in Mode::ALL {
        let health = dashboard.health(mode).await;
        info!(
            "{} poller: ticks={} failures={} consecutive={} stale={} last_error={}",
            mode,
            health.total_ticks,
            health.total_failures,
            health.consecutive_failures,
            health.stale_discards,
            health.last_error.as_deref().unwrap_or("-")
        );
    }
}

/// Render dashboard events to the log
async fn present(mut rx: broadcast::Receiver<DashboardEvent>) {
    loop {
        match rx.recv().await {
            Ok(DashboardEvent::SnapshotUpdated { snapshot, visible }) if visible => {
                match &snapshot.stats {
                    Some(stats) => info!("[{}] {}", snapshot.mode, StatsSummary(stats)),
                    None => info!("[{}] result without stats", snapshot.mode),
                }
            }
            Ok(DashboardEvent::AlertFired {
                mode,
                percent_plastic,
                ..
            }) => {
                warn!(
                    "[{}] POOR WATER QUALITY: {:.1}% plastic",
                    mode, percent_plastic
                );
            }
            Ok(event) => debug!("Event: {}", event.event_type()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Presenter lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
