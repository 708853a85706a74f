//! Detection service client
//!
//! Wraps the two read endpoints and the one write endpoint of the remote
//! detection service behind [`DetectionService`]. Transport failures are
//! normalized into [`Error::Transport`], undecodable payloads into
//! [`Error::MalformedResponse`].
//!
//! No retries happen here: the pollers retry by polling again on their next
//! tick, and a failed submission is retried by the user.

use async_trait::async_trait;
use mpdash_common::sample::{LivePayload, UploadPayload};
use mpdash_common::RawSample;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::staged::StagedFile;

const USER_AGENT: &str = concat!("mpdash-ui/", env!("CARGO_PKG_VERSION"));

/// Write endpoint: multipart image submission
pub const UPLOAD_PATH: &str = "/upload";
/// Read endpoint: most recent upload-mode result
pub const LATEST_PATH: &str = "/api/latest";
/// Read endpoint: live-device counters
pub const LIVE_STATS_PATH: &str = "/esp32/stats";
/// Continuous image stream, rendered directly by the front end
pub const LIVE_FEED_PATH: &str = "/esp32/video_feed";

/// Multipart field carrying the image
const UPLOAD_FIELD: &str = "file";

/// Remote detection service contract
#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Send a staged file to the write endpoint
    ///
    /// On failure the caller must not assume the sample was recorded.
    async fn submit_sample(&self, file: &StagedFile) -> Result<()>;

    /// Read the most recent upload-mode result; `None` when none exists yet
    async fn fetch_latest_upload(&self) -> Result<Option<RawSample>>;

    /// Read the current live-device counters
    async fn fetch_live_stats(&self) -> Result<RawSample>;

    /// Service base address that relative image paths resolve against
    fn base_url(&self) -> &str;
}

/// Resolve an image path from the service against its base address
///
/// Absolute `http(s)` addresses pass through unchanged.
pub fn resolve_image_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Parse and check a detection service base address
///
/// The one place a service address is validated: it must be an absolute
/// `http`/`https` URL with a host.
pub fn parse_service_url(base_url: &str) -> Result<reqwest::Url> {
    let url = reqwest::Url::parse(base_url.trim())
        .map_err(|e| Error::Config(format!("Invalid service URL {}: {}", base_url, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Service URL must be http or https: {}",
            base_url
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Config(format!("Service URL has no host: {}", base_url)));
    }
    Ok(url)
}

/// Address of the live image stream for a service
pub fn live_feed_url(base_url: &str) -> String {
    resolve_image_url(base_url, LIVE_FEED_PATH)
}

/// Acknowledgement body of `POST /upload` (optional, informational)
#[derive(Debug, Deserialize)]
struct SubmitAck {
    status: Option<String>,
    filename: Option<String>,
}

/// HTTP implementation of [`DetectionService`]
pub struct HttpDetectionClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpDetectionClient {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        parse_service_url(base_url)?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_body(&self, path: &str) -> Result<(StatusCode, Vec<u8>)> {
        let url = self.endpoint(path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("GET {}: {}", url, e)))?;
        Ok((status, body.to_vec()))
    }
}

fn status_error(method: &str, path: &str, status: StatusCode, body: &[u8]) -> Error {
    let text = String::from_utf8_lossy(body);
    Error::Transport(format!(
        "{} {} returned {}: {}",
        method,
        path,
        status.as_u16(),
        text.trim()
    ))
}

#[async_trait]
impl DetectionService for HttpDetectionClient {
    async fn submit_sample(&self, file: &StagedFile) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(file.bytes.as_ref().clone())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| Error::InvalidInput(format!("Bad content type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);

        let url = self.endpoint(UPLOAD_PATH);
        debug!(file = %file.name, bytes = file.len(), url = %url, "Submitting sample");

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("POST {}: {}", url, e)))?;

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        if !status.is_success() {
            return Err(status_error("POST", UPLOAD_PATH, status, &body));
        }

        match serde_json::from_slice::<SubmitAck>(&body) {
            Ok(ack) => info!(
                file = %file.name,
                status = ack.status.as_deref().unwrap_or("-"),
                stored_as = ack.filename.as_deref().unwrap_or("-"),
                "Sample accepted"
            ),
            Err(_) => info!(file = %file.name, "Sample accepted (no ack body)"),
        }
        Ok(())
    }

    async fn fetch_latest_upload(&self) -> Result<Option<RawSample>> {
        let (status, body) = self.get_body(LATEST_PATH).await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error("GET", LATEST_PATH, status, &body));
        }

        let payload: UploadPayload = serde_json::from_slice(&body)
            .map_err(|e| Error::MalformedResponse(format!("{}: {}", LATEST_PATH, e)))?;

        if payload.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawSample::Upload(payload)))
    }

    async fn fetch_live_stats(&self) -> Result<RawSample> {
        let (status, body) = self.get_body(LIVE_STATS_PATH).await?;

        if !status.is_success() {
            return Err(status_error("GET", LIVE_STATS_PATH, status, &body));
        }

        let payload: LivePayload = serde_json::from_slice(&body)
            .map_err(|e| Error::MalformedResponse(format!("{}: {}", LIVE_STATS_PATH, e)))?;
        Ok(RawSample::Live(payload))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
