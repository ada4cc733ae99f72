use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Unknown ffmpeg command key: {0}")]
    UnknownCommandKey(String),

    #[error("Discovery timeout must be greater than zero")]
    InvalidTimeout,

    #[error(transparent)]
    InvalidUrl(#[from] mediaforge_core::Error),

    #[error("Failed to launch process: {0}")]
    Launch(String),

    #[error("Media source {media} did not appear within {timeout:?}")]
    DiscoveryTimeout { media: String, timeout: Duration },

    #[error("Source is already playing")]
    AlreadyPlaying,

    #[error("Source was closed")]
    Closed,
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

#[derive(Error, Debug)]
pub enum SnapError {
    #[error("Failed to launch snapshot process: {0}")]
    Launch(String),

    #[error("Snapshot timed out after {0:?}")]
    Timeout(Duration),

    #[error("No internal decoder available for {0}")]
    UnsupportedProtocol(String),

    #[error("Snapshot decode failed: {0}")]
    Decode(String),

    #[error("Snapshot produced no output at {0}")]
    EmptyOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SnapResult<T> = std::result::Result<T, SnapError>;
