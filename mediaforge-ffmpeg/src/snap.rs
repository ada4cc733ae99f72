// One-shot frame capture.
//
// Two strategies: run the configured ffmpeg snapshot command, or hand the
// url to an in-process decoder when one is installed. Both are bounded by
// the caller's deadline, and a lapsed command-mode capture kills its
// process before reporting failure.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use mediaforge_core::config::FfmpegConfig;

use crate::cmd::build_command;
use crate::error::{SnapError, SnapResult};
use crate::process::ProcessRunner;

/// How a snapshot is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapMode {
    /// Spawn the configured snapshot command.
    Command,
    /// Decode the first frame in-process via the installed [`SnapDecoder`].
    Internal,
}

/// In-process single-frame decoder for urls the local protocol stacks can
/// consume directly.
#[async_trait]
pub trait SnapDecoder: Send + Sync {
    /// Decode the first video frame of `play_url` and write it as a JPEG
    /// to `save_path`.
    async fn snap(&self, play_url: &str, save_path: &Path) -> anyhow::Result<()>;
}

/// Snapshot service. Stateless between captures.
pub struct FfmpegSnap {
    runner: Arc<dyn ProcessRunner>,
    config: FfmpegConfig,
    decoder: Option<Arc<dyn SnapDecoder>>,
}

impl FfmpegSnap {
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, config: FfmpegConfig) -> Self {
        Self {
            runner,
            config,
            decoder: None,
        }
    }

    /// Install an in-process decoder, enabling [`SnapMode::Internal`].
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn SnapDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Capture one frame of `play_url` into `save_path`, bounded by
    /// `timeout`.
    pub async fn make_snap(
        &self,
        mode: SnapMode,
        play_url: &str,
        save_path: &Path,
        timeout: Duration,
    ) -> SnapResult<()> {
        if timeout.is_zero() {
            return Err(SnapError::Timeout(timeout));
        }
        debug!(url = play_url, path = %save_path.display(), ?mode, "Capturing snapshot");
        match mode {
            SnapMode::Command => self.snap_command(play_url, save_path, timeout).await,
            SnapMode::Internal => self.snap_internal(play_url, save_path, timeout).await,
        }
    }

    async fn snap_command(
        &self,
        play_url: &str,
        save_path: &Path,
        timeout: Duration,
    ) -> SnapResult<()> {
        let cmd = build_command(
            &self.config.bin,
            &self.config.snap_template,
            play_url,
            &save_path.display().to_string(),
        );
        let mut handle = self
            .runner
            .spawn(&cmd, None)
            .await
            .map_err(|e| SnapError::Launch(e.to_string()))?;

        match tokio::time::timeout(timeout, handle.wait()).await {
            Err(_) => {
                warn!(url = play_url, ?timeout, "Snapshot process timed out, killing it");
                handle.kill().await;
                Err(SnapError::Timeout(timeout))
            }
            Ok(_exit) => match tokio::fs::metadata(save_path).await {
                Ok(meta) if meta.len() > 0 => Ok(()),
                _ => Err(SnapError::EmptyOutput(save_path.to_path_buf())),
            },
        }
    }

    async fn snap_internal(
        &self,
        play_url: &str,
        save_path: &Path,
        timeout: Duration,
    ) -> SnapResult<()> {
        let decoder = self
            .decoder
            .as_ref()
            .ok_or_else(|| SnapError::UnsupportedProtocol(play_url.to_string()))?;

        match tokio::time::timeout(timeout, decoder.snap(play_url, save_path)).await {
            Err(_) => Err(SnapError::Timeout(timeout)),
            Ok(Err(e)) => Err(SnapError::Decode(e.to_string())),
            Ok(Ok(())) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessRunner;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDecoder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SnapDecoder for CountingDecoder {
        async fn snap(&self, _play_url: &str, save_path: &Path) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("no video track");
            }
            tokio::fs::write(save_path, b"\xff\xd8jpeg").await?;
            Ok(())
        }
    }

    fn snap_service(runner: &MockProcessRunner) -> FfmpegSnap {
        FfmpegSnap::new(Arc::new(runner.clone()), FfmpegConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_snap_success() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shot.jpeg");

        let runner = MockProcessRunner::new();
        runner.set_exit_after(Some(Duration::from_millis(300)));
        // The "process" writes the frame as a side effect of running.
        let path = out.clone();
        runner.set_on_spawn(Arc::new(move |_, _| {
            std::fs::write(&path, b"\xff\xd8jpeg").unwrap();
        }));

        let snap = snap_service(&runner);
        snap.make_snap(SnapMode::Command, "rtsp://cam/1", &out, Duration::from_secs(5))
            .await
            .unwrap();

        let cmd = &runner.spawn_records()[0].cmd;
        assert!(cmd.contains("rtsp://cam/1"));
        assert!(cmd.contains(out.to_str().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_snap_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shot.jpeg");

        // Child never exits on its own.
        let runner = MockProcessRunner::new();
        let snap = snap_service(&runner);

        let err = snap
            .make_snap(SnapMode::Command, "rtsp://cam/1", &out, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::Timeout(_)));
        assert!(runner.spawn_records()[0].is_killed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_snap_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shot.jpeg");

        // Child exits promptly but writes nothing.
        let runner = MockProcessRunner::new();
        runner.set_exit_after(Some(Duration::from_millis(100)));
        let snap = snap_service(&runner);

        let err = snap
            .make_snap(SnapMode::Command, "rtsp://cam/1", &out, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::EmptyOutput(_)));
    }

    #[tokio::test]
    async fn test_internal_snap_without_decoder() {
        let runner = MockProcessRunner::new();
        let snap = snap_service(&runner);

        let err = snap
            .make_snap(
                SnapMode::Internal,
                "rtsp://cam/1",
                Path::new("/tmp/unused.jpeg"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::UnsupportedProtocol(_)));
        assert_eq!(runner.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_internal_snap_uses_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shot.jpeg");

        let decoder = Arc::new(CountingDecoder {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let runner = MockProcessRunner::new();
        let snap = snap_service(&runner).with_decoder(Arc::clone(&decoder) as _);

        snap.make_snap(SnapMode::Internal, "rtsp://cam/1", &out, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.spawn_count(), 0);
        assert!(out.exists());
    }

    #[tokio::test]
    async fn test_internal_snap_decode_failure() {
        let decoder = Arc::new(CountingDecoder {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let runner = MockProcessRunner::new();
        let snap = snap_service(&runner).with_decoder(decoder as _);

        let err = snap
            .make_snap(
                SnapMode::Internal,
                "rtsp://cam/1",
                Path::new("/tmp/unused.jpeg"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::Decode(_)));
    }
}
