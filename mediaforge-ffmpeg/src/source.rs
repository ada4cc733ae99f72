// Process-backed media source bridge.
//
// Spawns an external ffmpeg process that pushes into the local registry,
// polls until the resulting media source appears, attaches itself as the
// source's lifecycle listener, and relaunches the process when the source
// closes underneath it. Relaunches are rate limited: a closure arriving
// before `restart.min_interval` has elapsed since the last launch defers
// the relaunch, it never drops it.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mediaforge_core::config::{FfmpegConfig, RestartConfig};
use mediaforge_core::registry::RecordFlags;
use mediaforge_core::{
    FireOnce, MediaInfo, MediaOriginType, MediaRegistry, MediaSource, MediaSourceEvent,
};

use crate::cmd::build_command;
use crate::error::{SourceError, SourceResult};
use crate::process::{ProcessHandle, ProcessRunner};

/// Parameters of an accepted play request, fixed for the bridge's lifetime
/// and reused verbatim by every relaunch.
#[derive(Clone)]
struct PlayParams {
    cmd_key: String,
    src_url: String,
    dst_url: String,
    cmd: String,
    media_info: MediaInfo,
    timeout: Duration,
}

struct SourceState {
    params: Option<PlayParams>,
    process: Option<Box<dyn ProcessHandle>>,
    restart_task: Option<JoinHandle<()>>,
    last_launch: Option<Instant>,
    record: RecordFlags,
    bound: Option<Arc<MediaSource>>,
}

/// Bridge that proxies an external stream into the registry through a
/// supervised child process.
pub struct FfmpegSource {
    registry: Arc<MediaRegistry>,
    runner: Arc<dyn ProcessRunner>,
    ffmpeg: FfmpegConfig,
    restart: RestartConfig,
    state: Mutex<SourceState>,
    on_close: FireOnce<()>,
    cancel: CancellationToken,
    closed: AtomicBool,
    self_ref: Weak<FfmpegSource>,
}

impl FfmpegSource {
    #[must_use]
    pub fn new(
        registry: Arc<MediaRegistry>,
        runner: Arc<dyn ProcessRunner>,
        ffmpeg: FfmpegConfig,
        restart: RestartConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            registry,
            runner,
            ffmpeg,
            restart,
            state: Mutex::new(SourceState {
                params: None,
                process: None,
                restart_task: None,
                last_launch: None,
                record: RecordFlags::default(),
                bound: None,
            }),
            on_close: FireOnce::new(),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            self_ref: weak.clone(),
        })
    }

    /// Register the terminal-failure callback. Fires at most once: when the
    /// owner closes the bridge or a relaunch cycle fails for good.
    pub fn set_on_close<F>(&self, cb: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_close.set(Arc::new(move |()| cb()));
    }

    /// Start pulling `src_url` and pushing to `dst_url` with the command
    /// template selected by `cmd_key`. Resolves once the pushed source has
    /// appeared in the registry, or with the reason it never did.
    ///
    /// The request is validated before anything is spawned; a rejected call
    /// leaves the bridge untouched.
    pub async fn play(
        &self,
        cmd_key: &str,
        src_url: &str,
        dst_url: &str,
        timeout: Duration,
    ) -> SourceResult<()> {
        if timeout.is_zero() {
            return Err(SourceError::InvalidTimeout);
        }
        let template = self
            .ffmpeg
            .command(cmd_key)
            .ok_or_else(|| SourceError::UnknownCommandKey(cmd_key.to_string()))?
            .to_string();
        let media_info = MediaInfo::parse(dst_url)?;
        let cmd = build_command(&self.ffmpeg.bin, &template, src_url, dst_url);

        {
            let mut state = self.state.lock();
            if state.params.is_some() {
                return Err(SourceError::AlreadyPlaying);
            }
            state.params = Some(PlayParams {
                cmd_key: cmd_key.to_string(),
                src_url: src_url.to_string(),
                dst_url: dst_url.to_string(),
                cmd,
                media_info: media_info.clone(),
                timeout,
            });
        }

        info!(media = %media_info, src = src_url, "Starting ffmpeg source");
        self.launch_and_discover().await
    }

    /// Set the recording flags carried by this bridge. Applied to the bound
    /// source immediately and re-applied to every source a relaunch binds.
    pub fn setup_record_flag(&self, hls: bool, mp4: bool) {
        let bound = {
            let mut state = self.state.lock();
            state.record = RecordFlags { hls, mp4 };
            state.bound.clone().map(|src| (src, state.record))
        };
        if let Some((src, flags)) = bound {
            src.set_record_flags(flags);
        }
    }

    /// Tear the bridge down: stop supervision, kill the process, detach and
    /// unregister the bound source, and fire the close callback.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let (task, process, bound) = {
            let mut state = self.state.lock();
            (
                state.restart_task.take(),
                state.process.take(),
                state.bound.take(),
            )
        };
        if let Some(task) = task {
            task.abort();
        }
        if let Some(src) = bound {
            src.clear_delegate();
            self.registry.unregister(src.info());
        }
        if let Some(mut process) = process {
            process.kill().await;
        }

        if let Some(params) = self.params() {
            info!(media = %params.media_info, "Ffmpeg source closed");
        }
        self.on_close.fire(());
    }

    // Accessors for the accepted play parameters. Stable from the moment
    // `play` accepts a request, `None` before.

    #[must_use]
    pub fn src_url(&self) -> Option<String> {
        self.params().map(|p| p.src_url)
    }

    #[must_use]
    pub fn dst_url(&self) -> Option<String> {
        self.params().map(|p| p.dst_url)
    }

    #[must_use]
    pub fn cmd(&self) -> Option<String> {
        self.params().map(|p| p.cmd)
    }

    #[must_use]
    pub fn cmd_key(&self) -> Option<String> {
        self.params().map(|p| p.cmd_key)
    }

    #[must_use]
    pub fn media_info(&self) -> Option<MediaInfo> {
        self.params().map(|p| p.media_info)
    }

    fn params(&self) -> Option<PlayParams> {
        self.state.lock().params.clone()
    }

    /// One launch cycle: spawn the process, then poll the registry until the
    /// pushed source appears or the deadline passes. On timeout the process
    /// is killed before the failure is reported.
    async fn launch_and_discover(&self) -> SourceResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SourceError::Closed);
        }
        let Some(params) = self.params() else {
            return Err(SourceError::Closed);
        };

        // The relaunch guard spaces launch attempts, so stamp before spawning.
        self.state.lock().last_launch = Some(Instant::now());

        let log_path = self.log_path(&params.media_info);
        let handle = self
            .runner
            .spawn(&params.cmd, log_path.as_deref())
            .await
            .map_err(|e| SourceError::Launch(e.to_string()))?;
        {
            let mut state = self.state.lock();
            if let Some(mut old) = state.process.replace(handle) {
                old.start_kill();
            }
        }

        let deadline = Instant::now() + params.timeout;
        let mut ticker = tokio::time::interval(self.restart.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The deadline caps the wait: a poll cadence coarser than the
            // timeout must not stretch the discovery window.
            let tick = tokio::select! {
                () = self.cancel.cancelled() => return Err(SourceError::Closed),
                tick = tokio::time::timeout_at(deadline, ticker.tick()) => tick,
            };

            if let Some(src) = self.registry.find(&params.media_info) {
                self.bind(&src);
                info!(media = %params.media_info, "Ffmpeg source is online");
                return Ok(());
            }

            if tick.is_err() || Instant::now() >= deadline {
                warn!(
                    media = %params.media_info,
                    timeout = ?params.timeout,
                    "Ffmpeg source never came online, killing process"
                );
                self.kill_process().await;
                return Err(SourceError::DiscoveryTimeout {
                    media: params.media_info.to_string(),
                    timeout: params.timeout,
                });
            }
        }
    }

    /// Attach to a freshly discovered source: become its lifecycle listener
    /// and apply the carried recording flags.
    fn bind(&self, src: &Arc<MediaSource>) {
        let weak: Weak<dyn MediaSourceEvent> = self.self_ref.clone();
        src.set_delegate(weak);
        let flags = {
            let mut state = self.state.lock();
            state.bound = Some(Arc::clone(src));
            state.record
        };
        src.set_record_flags(flags);
    }

    async fn kill_process(&self) {
        let process = self.state.lock().process.take();
        if let Some(mut process) = process {
            process.kill().await;
        }
    }

    /// Spawn the deferred-relaunch task. The task holds only a weak
    /// reference; the bridge going away cancels the relaunch.
    fn schedule_restart(&self) {
        let weak = self.self_ref.clone();
        let token = self.cancel.clone();
        let min_interval = self.restart.min_interval();
        let poll_interval = self.restart.poll_interval();

        let handle = tokio::spawn(async move {
            let wait = {
                let Some(this) = weak.upgrade() else { return };
                let state = this.state.lock();
                state
                    .last_launch
                    .map_or(Duration::ZERO, |t| min_interval.saturating_sub(t.elapsed()))
            };
            if !wait.is_zero() {
                debug!(defer = ?wait, "Deferring ffmpeg relaunch");
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(wait) => {}
                }
            }

            // Relaunch only once the registry has confirmed the close by
            // dropping the old entry; a discovery poll must never rebind
            // the dying source.
            loop {
                let gone = {
                    let Some(this) = weak.upgrade() else { return };
                    if this.closed.load(Ordering::SeqCst) {
                        return;
                    }
                    this.media_info()
                        .map_or(true, |info| this.registry.find(&info).is_none())
                };
                if gone {
                    break;
                }
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(poll_interval) => {}
                }
            }

            let Some(this) = weak.upgrade() else { return };
            if this.closed.load(Ordering::SeqCst) {
                return;
            }
            info!("Relaunching ffmpeg source");
            match this.launch_and_discover().await {
                Ok(()) | Err(SourceError::Closed) => {}
                Err(e) => {
                    warn!(error = %e, "Ffmpeg relaunch failed, giving up");
                    this.on_close.fire(());
                }
            }
        });

        let mut state = self.state.lock();
        if let Some(old) = state.restart_task.replace(handle) {
            old.abort();
        }
    }

    fn log_path(&self, info: &MediaInfo) -> Option<PathBuf> {
        self.ffmpeg.log_dir.as_ref().map(|dir| {
            Path::new(dir).join(format!(
                "ffmpeg-{}-{}.log",
                info.app,
                info.stream.replace('/', "_")
            ))
        })
    }
}

impl MediaSourceEvent for FfmpegSource {
    /// The bound source is closing. Accept the close, then bring the stream
    /// back by relaunching the process once the registry has dropped the
    /// entry, rate limited by the restart guard.
    fn on_close(&self, sender: &MediaSource) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        debug!(media = %sender.info(), "Bound source closed, scheduling relaunch");
        self.state.lock().bound = None;
        self.schedule_restart();
        true
    }

    fn origin_type(&self, _sender: &MediaSource) -> MediaOriginType {
        MediaOriginType::Ffmpeg
    }

    fn origin_url(&self, _sender: &MediaSource) -> String {
        self.src_url().unwrap_or_default()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.cancel.cancel();
        let mut state = self.state.lock();
        if let Some(task) = state.restart_task.take() {
            task.abort();
        }
        if let Some(mut process) = state.process.take() {
            process.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessRunner;
    use mediaforge_core::config::DEFAULT_CMD_KEY;

    fn test_source(
        registry: &Arc<MediaRegistry>,
        runner: &MockProcessRunner,
    ) -> Arc<FfmpegSource> {
        FfmpegSource::new(
            Arc::clone(registry),
            Arc::new(runner.clone()),
            FfmpegConfig::default(),
            RestartConfig {
                min_interval_ms: 2_000,
                poll_interval_ms: 100,
            },
        )
    }

    #[tokio::test]
    async fn test_unknown_command_key_is_rejected_before_spawn() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        let err = source
            .play(
                "no-such-key",
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnknownCommandKey(_)));
        assert_eq!(runner.spawn_count(), 0);
        assert!(source.src_url().is_none());
    }

    #[tokio::test]
    async fn test_zero_timeout_is_rejected_before_spawn() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        let err = source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::ZERO,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidTimeout));
        assert_eq!(runner.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_dst_url_is_rejected_before_spawn() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        let err = source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/only-app",
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidUrl(_)));
        assert_eq!(runner.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_as_launch_error() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        runner.set_fail_spawn(true);
        let source = test_source(&registry, &runner);

        let err = source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Launch(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accessors_stable_after_accepted_play() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        // Pre-register so discovery succeeds immediately.
        registry
            .register(MediaInfo::parse("rtmp://pub/live/s1").unwrap())
            .unwrap();

        source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(source.src_url().as_deref(), Some("rtsp://cam/1"));
        assert_eq!(source.dst_url().as_deref(), Some("rtmp://pub/live/s1"));
        assert_eq!(source.cmd_key().as_deref(), Some(DEFAULT_CMD_KEY));
        let cmd = source.cmd().unwrap();
        assert!(cmd.contains("rtsp://cam/1"));
        assert!(cmd.contains("rtmp://pub/live/s1"));
        assert_eq!(
            source.media_info().unwrap().to_string(),
            "rtmp/live/s1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_play_is_rejected() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        registry
            .register(MediaInfo::parse("rtmp://pub/live/s1").unwrap())
            .unwrap();
        source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let err = source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/2",
                "rtmp://pub/live/s2",
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::AlreadyPlaying));
        assert_eq!(runner.spawn_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_source_reports_origin() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        let media = registry
            .register(MediaInfo::parse("rtmp://pub/live/s1").unwrap())
            .unwrap();
        source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(media.origin_type(), MediaOriginType::Ffmpeg);
        assert_eq!(media.origin_url(), "rtsp://cam/1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_flags_applied_to_bound_source() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        // Flags set before discovery are applied at bind time.
        source.setup_record_flag(true, false);

        let media = registry
            .register(MediaInfo::parse("rtmp://pub/live/s1").unwrap())
            .unwrap();
        source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(media.record_flags().hls);
        assert!(!media.record_flags().mp4);

        // And updates propagate while bound.
        source.setup_record_flag(true, true);
        assert!(media.record_flags().mp4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_kills_process_and_fires_callback_once() {
        let registry = Arc::new(MediaRegistry::new());
        let runner = MockProcessRunner::new();
        let source = test_source(&registry, &runner);

        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        source.set_on_close(move || {
            assert!(!f.swap(true, Ordering::SeqCst));
        });

        registry
            .register(MediaInfo::parse("rtmp://pub/live/s1").unwrap())
            .unwrap();
        source
            .play(
                DEFAULT_CMD_KEY,
                "rtsp://cam/1",
                "rtmp://pub/live/s1",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        source.close().await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(runner.spawn_records()[0].is_killed());
        assert!(registry.is_empty());

        // Idempotent.
        source.close().await;
    }
}
