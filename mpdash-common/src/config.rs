//! Configuration loading and resolution
//!
//! Config file location, in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `MPDASH_CONFIG` environment variable
//! 3. Platform config dir (`~/.config/mpdash/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! An explicitly requested file (1 or 2) must exist. A missing platform file is
//! not an error: compiled defaults are used and the returned [`ConfigSource`]
//! says so, so the caller can report it once logging is up.
//!
//! The service address is then overridden individually, again highest first:
//! command line, `MPDASH_SERVICE_URL`, config file, compiled default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::time::millis_to_duration;
use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MPDASH_CONFIG";

/// Environment variable overriding the service address
pub const SERVICE_URL_ENV_VAR: &str = "MPDASH_SERVICE_URL";

/// Dashboard configuration
///
/// Every field has a compiled default, so a TOML file only needs to list the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Detection service base address
    pub service_url: String,
    /// Upload poller period (milliseconds)
    pub upload_poll_ms: u64,
    /// Live poller period (milliseconds)
    pub live_poll_ms: u64,
    /// Per-request HTTP timeout (milliseconds)
    pub request_timeout_ms: u64,
    /// Plastic share strictly above which an alert fires
    pub alert_threshold_percent: f64,
    /// Re-arm window while a source stays above the threshold (milliseconds)
    pub alert_cooldown_ms: u64,
    /// Gap between chimes inside one burst (milliseconds)
    pub chime_gap_ms: u64,
    /// Chimes played per burst
    pub chimes_per_burst: u32,
    /// Event bus capacity
    pub event_capacity: usize,
    /// Fallback tracing level when RUST_LOG is not set
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8000".to_string(),
            upload_poll_ms: 2000,
            live_poll_ms: 1000,
            request_timeout_ms: 5000,
            alert_threshold_percent: 10.0,
            alert_cooldown_ms: 30_000,
            chime_gap_ms: 500,
            chimes_per_burst: 2,
            event_capacity: 256,
            log_level: "info".to_string(),
        }
    }
}

impl DashboardConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DashboardConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the dashboard cannot run with
    ///
    /// `service_url` is only checked for presence here; its syntax is checked
    /// once, by the client that connects to it.
    pub fn validate(&self) -> Result<()> {
        if self.service_url.trim().is_empty() {
            return Err(Error::Config("service_url must not be empty".to_string()));
        }
        if self.upload_poll_ms == 0 || self.live_poll_ms == 0 {
            return Err(Error::Config("Poll periods must be non-zero".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be non-zero".to_string()));
        }
        if !(0.0..=100.0).contains(&self.alert_threshold_percent) {
            return Err(Error::Config(format!(
                "alert_threshold_percent out of range 0-100: {}",
                self.alert_threshold_percent
            )));
        }
        if self.chimes_per_burst == 0 {
            return Err(Error::Config("chimes_per_burst must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn upload_poll_interval(&self) -> Duration {
        millis_to_duration(self.upload_poll_ms)
    }

    pub fn live_poll_interval(&self) -> Duration {
        millis_to_duration(self.live_poll_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        millis_to_duration(self.request_timeout_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        millis_to_duration(self.alert_cooldown_ms)
    }

    pub fn chime_gap(&self) -> Duration {
        millis_to_duration(self.chime_gap_ms)
    }
}

/// Where the resolved configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from this file
    File(PathBuf),
    /// No file at the platform location; compiled defaults
    MissingPlatformFile(PathBuf),
    /// No platform config dir on this system; compiled defaults
    NoConfigDir,
}

impl ConfigSource {
    /// Report the source at the appropriate level
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                info!("Loaded configuration from {}", path.display())
            }
            ConfigSource::MissingPlatformFile(path) => warn!(
                "No config file at {}, using compiled defaults",
                path.display()
            ),
            ConfigSource::NoConfigDir => {
                warn!("Could not determine config directory, using compiled defaults")
            }
        }
    }
}

/// Resolves the effective configuration from CLI, environment and files
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_config_path: Option<PathBuf>,
    cli_service_url: Option<String>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config file given on the command line
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_config_path = path;
        self
    }

    /// Service address given on the command line
    pub fn with_service_url(mut self, url: Option<String>) -> Self {
        self.cli_service_url = url;
        self
    }

    /// Config file to load, with whether it was explicitly requested
    pub fn config_path(&self) -> Option<(PathBuf, bool)> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_config_path {
            return Some((path.clone(), true));
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), true));
            }
        }

        // Priority 3: Platform config dir
        default_config_path().map(|path| (path, false))
    }

    /// Load the config file (if any), then apply service address overrides
    pub fn resolve(&self) -> Result<DashboardConfig> {
        self.resolve_with_source().map(|(config, _)| config)
    }

    /// Like [`resolve`](Self::resolve), also reporting where the values came from
    pub fn resolve_with_source(&self) -> Result<(DashboardConfig, ConfigSource)> {
        let (mut config, source) = match self.config_path() {
            Some((path, _)) if path.exists() => {
                debug!("Loading configuration from {}", path.display());
                (DashboardConfig::from_file(&path)?, ConfigSource::File(path))
            }
            Some((path, true)) => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some((path, false)) => (
                DashboardConfig::default(),
                ConfigSource::MissingPlatformFile(path),
            ),
            None => (DashboardConfig::default(), ConfigSource::NoConfigDir),
        };

        if let Some(url) = &self.cli_service_url {
            debug!("Service URL from command line: {}", url);
            config.service_url = url.clone();
        } else if let Ok(url) = std::env::var(SERVICE_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                debug!("Service URL from {}: {}", SERVICE_URL_ENV_VAR, url);
                config.service_url = url;
            }
        }

        config.validate()?;
        Ok((config, source))
    }
}

/// Platform config file path (`<config dir>/mpdash/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mpdash").join("config.toml"))
}
