// Child-process seam.
//
// Supervision code talks to processes through `ProcessRunner` so tests can
// substitute a mock and drive launch/kill timing deterministically.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// A spawned child process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Request termination without waiting for the process to exit.
    fn start_kill(&mut self);

    /// Terminate the process and wait until it is gone.
    async fn kill(&mut self);

    /// Wait for the process to exit. `None` when no exit code is available
    /// (killed, or reaped elsewhere).
    async fn wait(&mut self) -> Option<i32>;
}

/// Spawns child processes from full shell command lines.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn `cmd`, redirecting stdout/stderr to `log_path` when given and
    /// discarding them otherwise.
    async fn spawn(
        &self,
        cmd: &str,
        log_path: Option<&Path>,
    ) -> std::io::Result<Box<dyn ProcessHandle>>;
}

/// Production runner backed by `tokio::process`.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(
        &self,
        cmd: &str,
        log_path: Option<&Path>,
    ) -> std::io::Result<Box<dyn ProcessHandle>> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd).stdin(Stdio::null());

        match log_path {
            Some(path) => {
                let log = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                command
                    .stdout(Stdio::from(log.try_clone()?))
                    .stderr(Stdio::from(log));
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        // Last line of defense if a handle is dropped without teardown.
        command.kill_on_drop(true);

        let child = command.spawn()?;
        debug!(pid = ?child.id(), %cmd, "Spawned child process");
        Ok(Box::new(TokioProcessHandle { child }))
    }
}

struct TokioProcessHandle {
    child: tokio::process::Child,
}

#[async_trait]
impl ProcessHandle for TokioProcessHandle {
    fn start_kill(&mut self) {
        // Already-exited children report an error here; nothing to do.
        let _ = self.child.start_kill();
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }

    async fn wait(&mut self) -> Option<i32> {
        self.child.wait().await.ok().and_then(|status| status.code())
    }
}

/// Hook invoked on each mock spawn with the spawn index and command line.
pub type SpawnHook = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// Record of one spawn through a [`MockProcessRunner`].
#[derive(Clone)]
pub struct SpawnRecord {
    pub cmd: String,
    pub spawned_at: Instant,
    killed: Arc<AtomicBool>,
    killed_at: Arc<Mutex<Option<Instant>>>,
}

impl SpawnRecord {
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn killed_at(&self) -> Option<Instant> {
        *self.killed_at.lock()
    }
}

/// Mock runner for tests: records every spawn, never runs a real process.
///
/// Mock children run until killed, unless `set_exit_after` gives them a
/// fixed lifetime.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    inner: Arc<MockRunnerState>,
}

#[derive(Default)]
struct MockRunnerState {
    fail_spawn: AtomicBool,
    exit_after: Mutex<Option<Duration>>,
    on_spawn: Mutex<Option<SpawnHook>>,
    spawns: Mutex<Vec<SpawnRecord>>,
}

impl MockProcessRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent spawn fail with an IO error.
    pub fn set_fail_spawn(&self, fail: bool) {
        self.inner.fail_spawn.store(fail, Ordering::SeqCst);
    }

    /// Give subsequently spawned children a fixed lifetime after which
    /// `wait` resolves with exit code 0.
    pub fn set_exit_after(&self, lifetime: Option<Duration>) {
        *self.inner.exit_after.lock() = lifetime;
    }

    pub fn set_on_spawn(&self, hook: SpawnHook) {
        *self.inner.on_spawn.lock() = Some(hook);
    }

    #[must_use]
    pub fn spawn_count(&self) -> usize {
        self.inner.spawns.lock().len()
    }

    #[must_use]
    pub fn spawn_records(&self) -> Vec<SpawnRecord> {
        self.inner.spawns.lock().clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn spawn(
        &self,
        cmd: &str,
        _log_path: Option<&Path>,
    ) -> std::io::Result<Box<dyn ProcessHandle>> {
        if self.inner.fail_spawn.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("mock spawn failure"));
        }

        let record = SpawnRecord {
            cmd: cmd.to_string(),
            spawned_at: Instant::now(),
            killed: Arc::new(AtomicBool::new(false)),
            killed_at: Arc::new(Mutex::new(None)),
        };

        let index = {
            let mut spawns = self.inner.spawns.lock();
            spawns.push(record.clone());
            spawns.len() - 1
        };

        let hook = self.inner.on_spawn.lock().clone();
        if let Some(hook) = hook {
            hook(index, cmd);
        }

        Ok(Box::new(MockProcessHandle {
            record,
            exit_after: *self.inner.exit_after.lock(),
            kill_notify: Arc::new(Notify::new()),
        }))
    }
}

struct MockProcessHandle {
    record: SpawnRecord,
    exit_after: Option<Duration>,
    kill_notify: Arc<Notify>,
}

#[async_trait]
impl ProcessHandle for MockProcessHandle {
    fn start_kill(&mut self) {
        if !self.record.killed.swap(true, Ordering::SeqCst) {
            *self.record.killed_at.lock() = Some(Instant::now());
        }
        self.kill_notify.notify_one();
    }

    async fn kill(&mut self) {
        self.start_kill();
    }

    async fn wait(&mut self) -> Option<i32> {
        if self.record.is_killed() {
            return None;
        }
        match self.exit_after {
            Some(lifetime) => {
                let deadline = self.record.spawned_at + lifetime;
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => Some(0),
                    () = self.kill_notify.notified() => None,
                }
            }
            None => {
                self.kill_notify.notified().await;
                None
            }
        }
    }
}
