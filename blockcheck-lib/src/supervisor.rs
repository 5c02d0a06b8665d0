//! Lifecycle management for the external circumvention engine.
//!
//! The engine is a separate binary that prints a readiness marker on stdout
//! once traffic capture has started. Startup is event-driven: we react to
//! the first of marker, stderr output, process exit, or timeout, instead of
//! sleeping a fixed interval and hoping.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::{ErrorKind, Result};

/// Line the engine prints once packet capture is live (matched
/// case-insensitively as a substring)
pub const DEFAULT_READY_MARKER: &str = "windivert initialized. capture is started.";

const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// How to spawn and babysit the engine process
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the engine binary
    pub binary: PathBuf,
    /// Working directory for the spawned process
    pub workdir: Option<PathBuf>,
    /// Readiness marker scanned for on stdout
    pub ready_marker: String,
    /// How long to wait for the marker before giving up
    pub start_timeout: Duration,
    /// Grace period between the terminate request and a hard kill
    pub stop_grace: Duration,
}

impl SupervisorConfig {
    #[must_use]
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            workdir: None,
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

enum Signal {
    Ready,
    Crashed,
}

struct EngineHandle {
    child: Child,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

/// Supervises at most one engine process at a time.
///
/// `start` transitions through spawning into one of ready, crashed, or
/// timed out; only ready leaves a tracked process behind. Every other
/// outcome tears the process down before returning, so a failed trial never
/// leaks a child or a reader task.
pub struct Supervisor {
    config: SupervisorConfig,
    handle: Option<EngineHandle>,
    stderr_text: Arc<Mutex<String>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            handle: None,
            stderr_text: Arc::new(Mutex::new(String::new())),
        }
    }

    /// Spawn the engine with `args` and wait until it is ready.
    ///
    /// Readiness is the marker line on stdout. Any non-empty stderr line
    /// before the marker, or the process exiting, counts as a crash; stderr
    /// keeps being collected for diagnostics either way. If a previous
    /// process is still tracked it is stopped first.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::EngineSpawn`] if the process cannot be started,
    /// [`ErrorKind::EngineCrashed`] with the captured stderr, or
    /// [`ErrorKind::EngineStartTimeout`] if the marker never appears.
    pub async fn start(&mut self, args: &[String]) -> Result<()> {
        self.stop().await;
        self.stderr_text.lock().expect("stderr lock poisoned").clear();

        let mut command = Command::new(&self.config.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.workdir {
            command.current_dir(dir);
        }
        log::debug!(
            "starting engine: {} {}",
            self.config.binary.display(),
            args.join(" ")
        );

        let mut child = command.spawn().map_err(ErrorKind::EngineSpawn)?;
        let (tx, mut rx) = mpsc::channel::<Signal>(2);

        let stdout = child.stdout.take().ok_or_else(|| {
            ErrorKind::EngineSpawn(std::io::Error::other("engine stdout not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ErrorKind::EngineSpawn(std::io::Error::other("engine stderr not captured"))
        })?;

        let marker = self.config.ready_marker.to_lowercase();
        let stdout_tx = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::trace!("engine stdout: {line}");
                if line.to_lowercase().contains(&marker) {
                    let _ = stdout_tx.send(Signal::Ready).await;
                    // Marker seen, nothing else on stdout matters.
                    break;
                }
            }
        });

        let captured = Arc::clone(&self.stderr_text);
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut signalled = false;
            while let Ok(Some(line)) = lines.next_line().await {
                log::trace!("engine stderr: {line}");
                {
                    let mut text = captured.lock().expect("stderr lock poisoned");
                    text.push_str(&line);
                    text.push('\n');
                }
                if !signalled && !line.trim().is_empty() {
                    let _ = tx.send(Signal::Crashed).await;
                    signalled = true;
                }
            }
        });

        enum StartOutcome {
            Ready,
            Crashed,
            TimedOut,
        }
        let outcome = tokio::select! {
            signal = rx.recv() => match signal {
                Some(Signal::Ready) => StartOutcome::Ready,
                // None means both readers finished without a signal, which
                // only happens when the process closed its streams.
                Some(Signal::Crashed) | None => StartOutcome::Crashed,
            },
            status = child.wait() => {
                log::debug!("engine exited before readiness: {status:?}");
                StartOutcome::Crashed
            }
            () = tokio::time::sleep(self.config.start_timeout) => StartOutcome::TimedOut,
        };

        let handle = EngineHandle {
            child,
            stdout_task,
            stderr_task,
        };
        match outcome {
            StartOutcome::Ready => {
                self.handle = Some(handle);
                Ok(())
            }
            StartOutcome::Crashed => {
                self.teardown(handle).await;
                Err(ErrorKind::EngineCrashed(self.stderr_text()))
            }
            StartOutcome::TimedOut => {
                self.teardown(handle).await;
                Err(ErrorKind::EngineStartTimeout(self.config.start_timeout))
            }
        }
    }

    /// Stop the tracked engine process, if any.
    ///
    /// Requests termination, escalates to a hard kill if the process
    /// outlives the grace period, and joins both stream readers before
    /// returning. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.teardown(handle).await;
        }
    }

    /// Everything the engine has written to stderr since the last `start`
    #[must_use]
    pub fn stderr_text(&self) -> String {
        self.stderr_text
            .lock()
            .expect("stderr lock poisoned")
            .clone()
    }

    /// Whether a process is currently tracked
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    async fn teardown(&self, mut handle: EngineHandle) {
        terminate(&mut handle.child);
        let waited =
            tokio::time::timeout(self.config.stop_grace, handle.child.wait()).await;
        if waited.is_err() {
            log::warn!("engine did not exit within grace period, killing");
            let _ = handle.child.kill().await;
        }
        // Reap both readers so no task outlives the call.
        handle.stdout_task.abort();
        handle.stderr_task.abort();
        let _ = handle.stdout_task.await;
        let _ = handle.stderr_task.await;
    }
}

/// Ask the process to exit on its own, so the engine gets a chance to
/// unload its capture driver. SIGTERM on Unix; Windows has no graceful
/// equivalent, there the request is already the hard kill.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // kill_on_drop on the child covers the process; reader tasks are
        // detached and finish when the pipes close.
        if self.handle.is_some() {
            log::warn!("supervisor dropped with a live engine process");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> (SupervisorConfig, Vec<String>) {
        let config = SupervisorConfig {
            start_timeout: Duration::from_secs(3),
            stop_grace: Duration::from_millis(500),
            ..SupervisorConfig::new(PathBuf::from("sh"))
        };
        (config, vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_ready_marker_detected() {
        let (config, args) =
            shell("echo 'windivert initialized. capture is started.'; sleep 10");
        let mut supervisor = Supervisor::new(config);

        supervisor.start(&args).await.unwrap();
        assert!(supervisor.is_running());

        supervisor.stop().await;
        assert!(!supervisor.is_running());
        assert!(supervisor.stderr_text().is_empty());
    }

    #[tokio::test]
    async fn test_marker_match_is_case_insensitive() {
        let (config, args) =
            shell("echo 'WinDivert initialized. Capture is started.'; sleep 10");
        let mut supervisor = Supervisor::new(config);

        supervisor.start(&args).await.unwrap();
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_stderr_line_means_crash() {
        let (config, args) = shell("echo 'driver load failed' >&2; sleep 10");
        let mut supervisor = Supervisor::new(config);

        let err = supervisor.start(&args).await.unwrap_err();
        match err {
            ErrorKind::EngineCrashed(text) => {
                assert!(text.contains("driver load failed"));
            }
            other => panic!("expected crash, got {other:?}"),
        }
        assert!(!supervisor.is_running());
        assert!(supervisor.stderr_text().contains("driver load failed"));
    }

    #[tokio::test]
    async fn test_silent_exit_means_crash() {
        let (config, args) = shell("true");
        let mut supervisor = Supervisor::new(config);

        let err = supervisor.start(&args).await.unwrap_err();
        assert!(matches!(err, ErrorKind::EngineCrashed(_)));
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_start_timeout() {
        let (mut config, args) = shell("sleep 30");
        config.start_timeout = Duration::from_millis(200);
        let mut supervisor = Supervisor::new(config);

        let err = supervisor.start(&args).await.unwrap_err();
        assert!(matches!(err, ErrorKind::EngineStartTimeout(_)));
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (config, _) = shell("true");
        let mut supervisor = Supervisor::new(config);

        supervisor.stop().await;
        supervisor.stop().await;
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_requests_graceful_exit_first() {
        // `wait` instead of a foreground sleep so the shell handles the
        // termination signal immediately and runs its trap.
        let dir = tempfile::tempdir().unwrap();
        let witness = dir.path().join("clean-exit");
        let (config, args) = shell(&format!(
            "trap 'touch {} && exit 0' TERM; \
             echo 'windivert initialized. capture is started.'; sleep 10 & wait",
            witness.display()
        ));
        let mut supervisor = Supervisor::new(config);

        supervisor.start(&args).await.unwrap();
        supervisor.stop().await;
        assert!(witness.exists(), "engine was killed without a chance to exit");
    }

    #[tokio::test]
    async fn test_restart_replaces_previous_process() {
        let (config, args) =
            shell("echo 'windivert initialized. capture is started.'; sleep 10");
        let mut supervisor = Supervisor::new(config);

        supervisor.start(&args).await.unwrap();
        supervisor.start(&args).await.unwrap();
        assert!(supervisor.is_running());
        supervisor.stop().await;
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let config = SupervisorConfig::new(PathBuf::from("/nonexistent/engine-bin"));
        let mut supervisor = Supervisor::new(config);

        let err = supervisor.start(&[]).await.unwrap_err();
        assert!(matches!(err, ErrorKind::EngineSpawn(_)));
    }
}
