// Media source model and the lifecycle event interceptor seam.
//
// A source's interceptor slot holds a weak reference: callbacks dispatched
// by the registry must never extend the interceptor's lifetime past its
// owner's teardown.

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

use super::media_info::MediaInfo;

/// How a media source came into existence. Answered by the source's event
/// interceptor for diagnostics and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOriginType {
    Unknown,
    RtmpPush,
    RtspPush,
    Pull,
    /// Process-backed ingestion (external transcoder/relay).
    Ffmpeg,
    Mp4Vod,
    Device,
}

impl std::fmt::Display for MediaOriginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::RtmpPush => "rtmp_push",
            Self::RtspPush => "rtsp_push",
            Self::Pull => "pull",
            Self::Ffmpeg => "ffmpeg",
            Self::Mp4Vod => "mp4_vod",
            Self::Device => "device",
        };
        write!(f, "{s}")
    }
}

/// Recording flags applied to a live source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFlags {
    pub hls: bool,
    pub mp4: bool,
}

/// Lifecycle hooks a listener attaches to a media source.
///
/// The registry consults the interceptor when a source is being torn down
/// (`on_close` may veto) and for origin-identity queries.
pub trait MediaSourceEvent: Send + Sync {
    /// A close of `sender` was requested (consumer- or error-initiated).
    /// Return whether the close is accepted.
    fn on_close(&self, sender: &MediaSource) -> bool {
        let _ = sender;
        true
    }

    fn origin_type(&self, sender: &MediaSource) -> MediaOriginType {
        let _ = sender;
        MediaOriginType::Unknown
    }

    fn origin_url(&self, sender: &MediaSource) -> String;
}

/// A live, registry-tracked producer of audio/video data.
pub struct MediaSource {
    info: MediaInfo,
    record: Mutex<RecordFlags>,
    delegate: RwLock<Option<Weak<dyn MediaSourceEvent>>>,
}

impl MediaSource {
    #[must_use]
    pub fn new(info: MediaInfo) -> Arc<Self> {
        Arc::new(Self {
            info,
            record: Mutex::new(RecordFlags::default()),
            delegate: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Attach a lifecycle listener, replacing any prior one.
    pub fn set_delegate(&self, delegate: Weak<dyn MediaSourceEvent>) {
        *self.delegate.write() = Some(delegate);
    }

    pub fn clear_delegate(&self) {
        *self.delegate.write() = None;
    }

    /// Upgrade the listener slot; `None` when no listener is attached or
    /// its owner is gone.
    #[must_use]
    pub fn delegate(&self) -> Option<Arc<dyn MediaSourceEvent>> {
        self.delegate.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn set_record_flags(&self, flags: RecordFlags) {
        *self.record.lock() = flags;
    }

    #[must_use]
    pub fn record_flags(&self) -> RecordFlags {
        *self.record.lock()
    }

    /// Origin type reported by the listener, `Unknown` without one.
    #[must_use]
    pub fn origin_type(&self) -> MediaOriginType {
        self.delegate()
            .map_or(MediaOriginType::Unknown, |d| d.origin_type(self))
    }

    /// Origin url reported by the listener, empty without one.
    #[must_use]
    pub fn origin_url(&self) -> String {
        self.delegate().map_or_else(String::new, |d| d.origin_url(self))
    }
}
