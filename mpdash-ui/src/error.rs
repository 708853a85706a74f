//! Error types for mpdash-ui
//!
//! Failure classes of the dashboard core:
//! - `Transport` / `MalformedResponse`: caught at the poll tick boundary,
//!   logged, never surfaced as faults. From `submit()` they reach the caller.
//! - `AudioPlayback`: observability only, always swallowed.

use thiserror::Error;

/// Main error type for mpdash-ui
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure, timeout or non-success HTTP status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload missing required fields or not decodable
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Tone could not be played (no device, stream error)
    #[error("Audio playback error: {0}")]
    AudioPlayback(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input (unreadable file, bad command)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] mpdash_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that a later retry may resolve
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Convenience Result type using mpdash-ui Error
pub type Result<T> = std::result::Result<T, Error>;
