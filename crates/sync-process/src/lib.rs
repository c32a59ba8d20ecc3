//! Argv-only subprocess execution.
//!
//! This is the single place in the workspace that is allowed to call
//! [`std::process::Command`]. Every other crate goes through [`run`], which
//! never interprets a shell: callers build an argument vector and `run`
//! spawns `Command::new(binary).args(args)` directly. There is no path from
//! a configuration string to a shell command line anywhere in this crate.
//!
//! The workspace forbids `unsafe_code`; this crate carries the single
//! documented exception (a raw `libc::kill` for a graceful SIGTERM before
//! escalating to `Child::kill`) and allows it explicitly below rather than
//! relaxing the workspace-wide lint.
//!
//! # Example
//!
//! ```ignore
//! use sync_process::{run, RunOptions};
//!
//! let outcome = run("git", &["rev-parse", "HEAD"], &RunOptions::default())?;
//! assert!(outcome.success());
//! ```

#![allow(unsafe_code)]

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sync_types::SyncError;

/// How long to wait after a termination signal before escalating to a kill.
const TERM_GRACE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Options for one subprocess invocation.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// When `false`, the child inherits the parent's stdio instead of
    /// having stdout/stderr captured into buffers.
    pub capture: bool,
    pub env: Vec<(String, String)>,
    /// Polled alongside the timeout deadline; set this from a shutdown
    /// handler to cancel an in-flight call. Behaves like a timeout.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self {
            capture: true,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Captured result of a successful (zero-exit) subprocess call.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `binary` with `args` as an argv vector — never through a shell.
pub fn run(binary: &str, args: &[&str], opts: &RunOptions) -> Result<CommandOutcome, SyncError> {
    let start = Instant::now();

    let mut command = Command::new(binary);
    command.args(args);
    if let Some(dir) = &opts.working_dir {
        command.current_dir(dir);
    }
    for (k, v) in &opts.env {
        command.env(k, v);
    }

    if opts.capture {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    }

    let mut child = command.spawn().map_err(|e| SyncError::ExecSpawn {
        binary: binary.to_string(),
        cause: e.to_string(),
    })?;

    let Some(timeout) = opts.timeout else {
        return wait_to_completion(binary, &mut child, start, opts.capture);
    };

    let deadline = start + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let (stdout, stderr) = drain(&mut child, opts.capture);
                return finish(binary, status.code(), stdout, stderr, start.elapsed());
            }
            Ok(None) => {}
            Err(e) => {
                return Err(SyncError::ExecSpawn {
                    binary: binary.to_string(),
                    cause: format!("failed to poll child: {e}"),
                });
            }
        }

        let timed_out = Instant::now() >= deadline;
        let cancelled = opts
            .cancel
            .as_ref()
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(false);

        if timed_out || cancelled {
            terminate_with_grace(&mut child);
            let (stdout, stderr) = drain(&mut child, opts.capture);
            return Err(SyncError::ExecTimeout {
                binary: binary.to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
                partial_stdout: stdout,
                partial_stderr: stderr,
            });
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

fn wait_to_completion(
    binary: &str,
    child: &mut Child,
    start: Instant,
    capture: bool,
) -> Result<CommandOutcome, SyncError> {
    let status = child.wait().map_err(|e| SyncError::ExecSpawn {
        binary: binary.to_string(),
        cause: format!("failed to wait for child: {e}"),
    })?;
    let (stdout, stderr) = drain(child, capture);
    finish(binary, status.code(), stdout, stderr, start.elapsed())
}

fn finish(
    binary: &str,
    code: Option<i32>,
    stdout: String,
    stderr: String,
    duration: Duration,
) -> Result<CommandOutcome, SyncError> {
    match code {
        Some(0) => Ok(CommandOutcome {
            stdout,
            stderr,
            exit_code: 0,
            duration,
        }),
        other => Err(SyncError::ExecExit {
            binary: binary.to_string(),
            code: other,
            stderr,
        }),
    }
}

fn drain(child: &mut Child, capture: bool) -> (String, String) {
    if !capture {
        return (String::new(), String::new());
    }
    (
        read_pipe(child.stdout.take()),
        read_pipe(child.stderr.take()),
    )
}

fn read_pipe<R: Read>(stream: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn terminate_with_grace(child: &mut Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
    let grace_deadline = Instant::now() + TERM_GRACE;
    while Instant::now() < grace_deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate_with_grace(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// `true` when `binary` is resolvable on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    which::which(binary).is_ok()
}

/// Full path to `binary` on `PATH`, if any.
pub fn which(binary: &str) -> Option<PathBuf> {
    which::which(binary).ok()
}

/// Run `binary --version` and return the trimmed first line of stdout, for
/// the `doctor` diagnostic.
pub fn version_of(binary: &str) -> Result<String, SyncError> {
    let outcome = run(binary, &["version", "--client"], &RunOptions::new())
        .or_else(|_| run(binary, &["--version"], &RunOptions::new()))?;
    Ok(outcome
        .stdout
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string())
}
