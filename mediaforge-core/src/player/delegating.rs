use std::sync::Arc;

use crate::callback::FireOnce;
use crate::registry::MediaSource;

use super::base::{
    EventCallback, PlayResult, Player, ResumeCallback, SeekTarget, SockInfo, Track, TrackType,
};

/// Adapter composing a statically chosen parent implementation with an
/// optional runtime-selected delegate.
///
/// The adapter is in exactly one of two modes for its whole lifetime:
/// "delegating" (a delegate was attached; every operation forwards to it) or
/// "native" (no delegate; every operation falls through to the parent).
/// Callback setters forward *and* retain a local copy, so callbacks
/// registered before the delegate existed stay available, and the adapter's
/// own report hooks work in native mode.
pub struct DelegatingPlayer<P: Player> {
    parent: P,
    delegate: Option<Box<dyn Player>>,
    media_src: Option<Arc<MediaSource>>,
    on_shutdown: FireOnce<PlayResult>,
    on_play_result: FireOnce<PlayResult>,
    on_resume: Option<ResumeCallback>,
}

impl<P: Player> DelegatingPlayer<P> {
    /// Native mode: all behavior falls through to `parent`.
    pub fn new(parent: P) -> Self {
        Self {
            parent,
            delegate: None,
            media_src: None,
            on_shutdown: FireOnce::new(),
            on_play_result: FireOnce::new(),
            on_resume: None,
        }
    }

    /// Delegating mode: every operation forwards to `delegate`. The mode is
    /// fixed at construction and does not change for this instance.
    pub fn with_delegate(parent: P, delegate: Box<dyn Player>) -> Self {
        let mut this = Self::new(parent);
        this.delegate = Some(delegate);
        this
    }

    #[must_use]
    pub fn has_delegate(&self) -> bool {
        self.delegate.is_some()
    }

    #[must_use]
    pub fn media_source(&self) -> Option<&Arc<MediaSource>> {
        self.media_src.as_ref()
    }

    /// Report an abnormal shutdown. Fires the stored callback at most once
    /// per registration.
    pub fn on_shutdown(&self, result: PlayResult) {
        self.on_shutdown.fire(result);
    }

    /// Report the play result. Fires the stored callback at most once per
    /// registration.
    pub fn on_play_result(&self, result: PlayResult) {
        self.on_play_result.fire(result);
    }

    /// Report a playback resume. Unlike the two above, this may fire every
    /// time playback recovers.
    pub fn on_resume(&self) {
        if let Some(cb) = &self.on_resume {
            cb();
        }
    }
}

impl<P: Player> Player for DelegatingPlayer<P> {
    fn play(&mut self, url: &str) {
        match &mut self.delegate {
            Some(d) => d.play(url),
            None => self.parent.play(url),
        }
    }

    fn pause(&mut self, flag: bool) {
        match &mut self.delegate {
            Some(d) => d.pause(flag),
            None => self.parent.pause(flag),
        }
    }

    fn speed(&mut self, factor: f32) {
        match &mut self.delegate {
            Some(d) => d.speed(factor),
            None => self.parent.speed(factor),
        }
    }

    fn teardown(&mut self) {
        match &mut self.delegate {
            Some(d) => d.teardown(),
            None => self.parent.teardown(),
        }
    }

    fn duration(&self) -> f32 {
        match &self.delegate {
            Some(d) => d.duration(),
            None => self.parent.duration(),
        }
    }

    fn progress(&self) -> f32 {
        match &self.delegate {
            Some(d) => d.progress(),
            None => self.parent.progress(),
        }
    }

    fn progress_pos(&self) -> u32 {
        match &self.delegate {
            Some(d) => d.progress_pos(),
            None => self.parent.progress_pos(),
        }
    }

    fn seek_to(&mut self, target: SeekTarget) {
        match &mut self.delegate {
            Some(d) => d.seek_to(target),
            None => self.parent.seek_to(target),
        }
    }

    fn packet_loss_rate(&self, track: TrackType) -> f32 {
        match &self.delegate {
            Some(d) => d.packet_loss_rate(track),
            None => self.parent.packet_loss_rate(track),
        }
    }

    fn tracks(&self, ready: bool) -> Vec<Track> {
        match &self.delegate {
            Some(d) => d.tracks(ready),
            None => self.parent.tracks(ready),
        }
    }

    fn recv_speed(&self) -> usize {
        match &self.delegate {
            Some(d) => d.recv_speed(),
            None => self.parent.recv_speed(),
        }
    }

    fn recv_total_bytes(&self) -> usize {
        match &self.delegate {
            Some(d) => d.recv_total_bytes(),
            None => self.parent.recv_total_bytes(),
        }
    }

    fn set_media_source(&mut self, src: Arc<MediaSource>) {
        if let Some(d) = &mut self.delegate {
            d.set_media_source(Arc::clone(&src));
        }
        self.media_src = Some(src);
    }

    fn set_on_shutdown(&mut self, cb: EventCallback) {
        if let Some(d) = &mut self.delegate {
            d.set_on_shutdown(Arc::clone(&cb));
        }
        self.on_shutdown.set(cb);
    }

    fn set_on_play_result(&mut self, cb: EventCallback) {
        if let Some(d) = &mut self.delegate {
            d.set_on_play_result(Arc::clone(&cb));
        }
        self.on_play_result.set(cb);
    }

    fn set_on_resume(&mut self, cb: ResumeCallback) {
        if let Some(d) = &mut self.delegate {
            d.set_on_resume(Arc::clone(&cb));
        }
        self.on_resume = Some(cb);
    }

    /// Transport identity comes from the delegate only; the statically
    /// composed parent is never consulted.
    fn sock_info(&self) -> Option<SockInfo> {
        self.delegate.as_ref().and_then(|d| d.sock_info())
    }
}
