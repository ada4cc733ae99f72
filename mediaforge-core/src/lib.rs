// Core model for the media-ingestion layer: registry of live media sources,
// the playback capability surface, configuration, and shared callback slots.

pub mod callback;
pub mod config;
pub mod error;
pub mod logging;
pub mod player;
pub mod registry;

pub use callback::FireOnce;
pub use config::{Config, FfmpegConfig, LoggingConfig, RestartConfig, DEFAULT_CMD_KEY};
pub use error::{Error, Result};
pub use registry::{MediaInfo, MediaOriginType, MediaRegistry, MediaSource, MediaSourceEvent};
