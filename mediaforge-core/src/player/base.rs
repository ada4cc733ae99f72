use std::sync::Arc;
use thiserror::Error;

use crate::registry::MediaSource;

/// Terminal error carried by shutdown / play-result events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("play refused: {0}")]
    Refused(String),

    #[error("operation timed out")]
    Timeout,

    #[error("connection shut down: {0}")]
    Shutdown(String),

    #[error("{0}")]
    Other(String),
}

/// Outcome delivered to play-result and shutdown callbacks; `Ok(())` marks a
/// normal result (successful play start, clean shutdown).
pub type PlayResult = std::result::Result<(), PlayerError>;

/// Callback for play-result and shutdown events. Shareable so an adapter can
/// both retain it and forward it to a delegate; fire-once semantics are
/// enforced by the slot holding it, not the callback type.
pub type EventCallback = Arc<dyn Fn(PlayResult) + Send + Sync>;

/// Callback for playback-resume notifications; may fire repeatedly.
pub type ResumeCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
    /// Aggregate across all tracks.
    All,
}

/// A negotiated media track.
#[derive(Debug, Clone)]
pub struct Track {
    pub kind: TrackType,
    pub codec: String,
    pub ready: bool,
}

/// Seek request: either a fraction of the total duration or an absolute
/// offset in seconds from the start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    Progress(f32),
    Position(u32),
}

/// Socket/transport identity of a connected player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SockInfo {
    pub local_addr: String,
    pub peer_addr: String,
}

/// Playback control capability.
///
/// Everything except the media-source and callback setters has a safe
/// default (no-op / zero / -1), so a partial implementation remains usable.
pub trait Player: Send {
    /// Start playback of `url`.
    fn play(&mut self, url: &str) {
        let _ = url;
    }

    /// Pause (`true`) or resume (`false`).
    fn pause(&mut self, flag: bool) {
        let _ = flag;
    }

    /// Playback rate, e.g. 0.5 / 1.0 / 2.0.
    fn speed(&mut self, factor: f32) {
        let _ = factor;
    }

    /// Interrupt playback and release resources.
    fn teardown(&mut self) {}

    /// Total duration in seconds; 0 when live or unknown.
    fn duration(&self) -> f32 {
        0.0
    }

    /// Playback progress, 0.0 ~ 1.0.
    fn progress(&self) -> f32 {
        0.0
    }

    /// Playback position in seconds from the start.
    fn progress_pos(&self) -> u32 {
        0
    }

    fn seek_to(&mut self, target: SeekTarget) {
        let _ = target;
    }

    /// Packet loss rate for a track; -1.0 when unsupported.
    fn packet_loss_rate(&self, track: TrackType) -> f32 {
        let _ = track;
        -1.0
    }

    fn tracks(&self, ready: bool) -> Vec<Track> {
        let _ = ready;
        Vec::new()
    }

    /// Current receive rate in bytes per second.
    fn recv_speed(&self) -> usize {
        0
    }

    fn recv_total_bytes(&self) -> usize {
        0
    }

    /// Supply a media source for proxy-publishing.
    fn set_media_source(&mut self, src: Arc<MediaSource>);

    /// Register the abnormal-shutdown callback (fires at most once per
    /// registration).
    fn set_on_shutdown(&mut self, cb: EventCallback);

    /// Register the play-result callback (fires at most once per
    /// registration).
    fn set_on_play_result(&mut self, cb: EventCallback);

    /// Register the playback-resume callback.
    fn set_on_resume(&mut self, cb: ResumeCallback);

    /// Socket/transport identity, when the implementation exposes one.
    fn sock_info(&self) -> Option<SockInfo> {
        None
    }
}
