//! Supervision of one nested_fit process.
//!
//! `RunProcess::start()` spawns the executable and background tokio tasks
//! that own its stdout and stderr. Lines from both are forwarded over one
//! mpsc channel, so reading progress never blocks the caller's refresh loop,
//! lines written right before the process exits are still delivered
//! afterwards, and nothing the child writes lands on the terminal directly.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{NestfitError, Result};

/// Executable names are the prefix followed by the tool version.
pub const EXECUTABLE_PREFIX: &str = "nested_fit";

/// Log-only, non-interactive, errors only.
pub const RUN_FLAGS: [&str; 3] = ["-lo", "-v", "error"];

/// `nested_fit<version>`, e.g. `nested_fit5.3.0`.
pub fn executable_name(version: &str) -> String {
    format!("{EXECUTABLE_PREFIX}{version}")
}

/// Lifecycle of a [`RunProcess`]. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Running,
    Exited(ExitStatus),
}

/// Outcome of a bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    /// Nothing arrived within the timeout.
    Idle,
    /// The output stream is closed and drained.
    Closed,
}

/// Handle to one nested_fit invocation.
pub struct RunProcess {
    program: OsString,
    args: Vec<OsString>,
    run_dir: PathBuf,
    phase: RunPhase,
    child: Option<Child>,
    lines: Option<mpsc::UnboundedReceiver<String>>,
}

impl RunProcess {
    /// Prepare a run of `program` with the fixed nested_fit flags in `run_dir`.
    pub fn new(program: impl Into<OsString>, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: RUN_FLAGS.iter().map(OsString::from).collect(),
            run_dir: run_dir.into(),
            phase: RunPhase::NotStarted,
            child: None,
            lines: None,
        }
    }

    /// Replace the command-line arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        self
    }

    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Spawn the process. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != RunPhase::NotStarted {
            return Err(NestfitError::AlreadyStarted);
        }

        let run_dir = self
            .run_dir
            .canonicalize()
            .map_err(|_| NestfitError::RunDirNotFound(self.run_dir.clone()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| NestfitError::Spawn {
                program: self.program(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| NestfitError::Spawn {
            program: self.program(),
            source: std::io::Error::other("stdout was not captured"),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| NestfitError::Spawn {
            program: self.program(),
            source: std::io::Error::other("stderr was not captured"),
        })?;

        // The channel closes once both readers are done.
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(forward_lines(stderr, sender.clone()));
        tokio::spawn(forward_lines(stdout, sender));

        info!(
            program = %self.program(),
            pid = ?child.id(),
            dir = %run_dir.display(),
            "nested_fit started"
        );

        self.child = Some(child);
        self.lines = Some(receiver);
        self.phase = RunPhase::Running;
        Ok(())
    }

    /// Non-blocking liveness check.
    pub fn poll_exit(&mut self) -> Result<Option<ExitStatus>> {
        let phase = self.phase;
        match phase {
            RunPhase::NotStarted => Err(NestfitError::NotRunning),
            RunPhase::Exited(status) => Ok(Some(status)),
            RunPhase::Running => {
                let child = self.child.as_mut().ok_or(NestfitError::NotRunning)?;
                let status = child.try_wait()?;
                if let Some(status) = status {
                    self.mark_exited(status);
                }
                Ok(status)
            }
        }
    }

    /// Next output line; `None` once the stream is closed and drained.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!`.
    pub async fn recv_line(&mut self) -> Option<String> {
        match self.lines.as_mut() {
            Some(lines) => lines.recv().await,
            None => None,
        }
    }

    /// Next output line, waiting at most `timeout`.
    pub async fn next_line(&mut self, timeout: Duration) -> LineEvent {
        match tokio::time::timeout(timeout, self.recv_line()).await {
            Ok(Some(line)) => LineEvent::Line(line),
            Ok(None) => LineEvent::Closed,
            Err(_) => LineEvent::Idle,
        }
    }

    /// Wait for the process to exit and collect its status.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let phase = self.phase;
        match phase {
            RunPhase::NotStarted => Err(NestfitError::NotRunning),
            RunPhase::Exited(status) => Ok(status),
            RunPhase::Running => {
                let child = self.child.as_mut().ok_or(NestfitError::NotRunning)?;
                let status = child.wait().await?;
                self.mark_exited(status);
                Ok(status)
            }
        }
    }

    /// Terminate the process. A process that already exited is left alone.
    pub async fn kill(&mut self) -> Result<()> {
        match self.phase {
            RunPhase::NotStarted => Err(NestfitError::NotRunning),
            RunPhase::Exited(_) => Ok(()),
            RunPhase::Running => {
                let child = self.child.as_mut().ok_or(NestfitError::NotRunning)?;
                child.start_kill()?;
                self.wait().await?;
                Ok(())
            }
        }
    }

    fn mark_exited(&mut self, status: ExitStatus) {
        debug!(code = ?status.code(), "nested_fit exited");
        self.phase = RunPhase::Exited(status);
    }
}

/// Reader task: one channel message per line, decoded lossily.
async fn forward_lines<R: AsyncRead + Unpin>(stream: R, sender: mpsc::UnboundedSender<String>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if sender.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read nested_fit output: {}", e);
                break;
            }
        }
    }
}
