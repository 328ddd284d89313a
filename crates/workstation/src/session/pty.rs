//! PTY session management.
//!
//! This module provides the core PTY spawning and I/O functionality.
//! A session represents a single interactive shell attached to a
//! pseudo-terminal. It owns three OS resources: the child process, the PTY
//! master, and the reader/writer handles cloned from it. All of them are
//! released by [`Session::close`], which is idempotent, or by `Drop` if the
//! session is abandoned without being closed.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use protocol::TerminalSize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{ExtensionsConfig, ShellConfig};

/// Unique identifier for a session.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session has already been terminated.
    #[error("session already terminated: {0}")]
    AlreadyTerminated(SessionId),

    /// Failed to allocate the PTY or spawn the shell.
    #[error("failed to spawn PTY: {0}")]
    SpawnFailed(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    WriteFailed(String),

    /// Failed to read from the PTY.
    #[error("failed to read from PTY: {0}")]
    ReadFailed(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    /// Failed to kill or reap the shell.
    #[error("failed to kill session: {0}")]
    KillFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Session has exited with a code.
    Exited(i32),
    /// Session terminated for unknown reason.
    Terminated,
}

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Capacity of the channel between the reader thread and the outbound pump.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// A fully resolved command line for an interactive shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    /// Interpreter path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Variables layered on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Working directory, inherited when `None`.
    pub cwd: Option<PathBuf>,
}

impl ShellCommand {
    /// Builds the interactive shell command used for browser sessions.
    ///
    /// The interpreter is resolved from the configured preference list and
    /// the environment gains `TERM`, `KREW_ROOT` and a `PATH` that puts the
    /// extension bin directory first.
    pub fn interactive(shell: &ShellConfig, extensions: &ExtensionsConfig) -> Self {
        let mut env = vec![("TERM".to_string(), shell.term.clone())];
        env.extend(extensions.environment());

        Self {
            program: resolve_shell(&shell.preferred, &shell.fallback),
            args: vec!["-i".to_string()],
            env,
            cwd: None,
        }
    }

    /// A plain command with no extra arguments or environment.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }
}

/// Picks the preferred interpreter if it is installed, otherwise the fallback.
pub fn resolve_shell(preferred: &str, fallback: &str) -> String {
    let path = Path::new(preferred);
    let available = if path.is_absolute() {
        path.exists()
    } else {
        which::which(preferred).is_ok()
    };

    if available {
        preferred.to_string()
    } else {
        tracing::debug!(preferred, fallback, "Preferred shell not found, falling back");
        fallback.to_string()
    }
}

/// A PTY session with a shell process.
pub struct Session {
    /// Unique session identifier.
    id: SessionId,

    /// The PTY master handle. `None` once closed.
    master: Arc<Mutex<Option<Box<dyn MasterPty + Send>>>>,

    /// The writer for the PTY. `None` once closed.
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,

    /// The reader for the PTY, handed to the reader thread on start.
    reader: Mutex<Option<Box<dyn Read + Send>>>,

    /// The child process.
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,

    /// Current terminal size.
    size: Mutex<TerminalSize>,

    /// Set once teardown has started.
    closed: AtomicBool,

    /// Process ID.
    pid: Option<u32>,

    /// When the shell was started.
    started_at: DateTime<Utc>,
}

impl Session {
    /// Spawns a new PTY session running `command` at the given size.
    pub fn spawn(command: &ShellCommand, size: TerminalSize) -> Result<Self, SessionError> {
        let id = Uuid::new_v4().to_string();

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(size))
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        // Take the I/O handles before spawning so a failure here cannot
        // leave a running child behind.
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&command.program);
        cmd.args(&command.args);
        if let Some(ref dir) = command.cwd {
            cmd.cwd(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(format!("{}: {}", command.program, e)))?;

        // The slave end must not stay open in this process, otherwise the
        // reader never sees EOF when the shell exits.
        drop(pair.slave);

        let pid = child.process_id();

        tracing::info!(
            session_id = %id,
            pid = ?pid,
            shell = %command.program,
            cols = size.cols,
            rows = size.rows,
            "Spawned shell session"
        );

        Ok(Session {
            id,
            master: Arc::new(Mutex::new(Some(pair.master))),
            writer: Arc::new(Mutex::new(Some(writer))),
            reader: Mutex::new(Some(reader)),
            child: Arc::new(Mutex::new(child)),
            size: Mutex::new(size),
            closed: AtomicBool::new(false),
            pid,
            started_at: Utc::now(),
        })
    }

    /// Returns the session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the current terminal size.
    pub fn size(&self) -> TerminalSize {
        *lock(&self.size)
    }

    /// Returns when the shell was started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns whether teardown has started.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Starts the reader thread and returns the stream of output chunks.
    ///
    /// The thread ends on EOF, on a read error (the PTY was closed or the
    /// shell exited), or when the receiver is dropped. Can only be called
    /// once per session.
    pub fn start_reader(&self) -> Result<mpsc::Receiver<Vec<u8>>, SessionError> {
        let mut reader = lock(&self.reader)
            .take()
            .ok_or_else(|| SessionError::ReadFailed("reader already started".to_string()))?;

        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let session_id = self.id.clone();

        std::thread::Builder::new()
            .name(format!("pty-reader-{}", &self.id[..8]))
            .spawn(move || {
                let mut buffer = vec![0u8; READ_BUFFER_SIZE];
                loop {
                    match reader.read(&mut buffer) {
                        Ok(0) => {
                            tracing::debug!(session_id = %session_id, "PTY EOF");
                            break;
                        }
                        Ok(n) => {
                            if tx.blocking_send(buffer[..n].to_vec()).is_err() {
                                tracing::trace!(session_id = %session_id, "Output receiver gone");
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            // EIO is the normal way a PTY reports the shell went away.
                            tracing::debug!(session_id = %session_id, error = %e, "PTY read ended");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SessionError::ReadFailed(e.to_string()))?;

        Ok(rx)
    }

    /// Writes data to the PTY (stdin).
    pub async fn write(&self, data: Vec<u8>) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::AlreadyTerminated(self.id.clone()));
        }

        let writer = Arc::clone(&self.writer);
        let id = self.id.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&writer);
            let writer = guard
                .as_mut()
                .ok_or(SessionError::AlreadyTerminated(id))?;
            writer
                .write_all(&data)
                .and_then(|_| writer.flush())
                .map_err(|e| SessionError::WriteFailed(e.to_string()))
        })
        .await
        .map_err(|e| SessionError::WriteFailed(e.to_string()))?
    }

    /// Resizes the PTY to the given dimensions.
    pub fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        let master = lock(&self.master);
        let master = match master.as_ref() {
            Some(master) if !self.is_closed() => master,
            _ => return Err(SessionError::AlreadyTerminated(self.id.clone())),
        };

        master
            .resize(pty_size(size))
            .map_err(|e| SessionError::ResizeFailed(e.to_string()))?;

        *lock(&self.size) = size;

        tracing::debug!(
            session_id = %self.id,
            cols = size.cols,
            rows = size.rows,
            "Resized PTY"
        );

        Ok(())
    }

    /// Terminates the shell and releases the PTY.
    ///
    /// Safe to call any number of times from any task: only the first call
    /// does the work and returns the exit status, later calls return `None`.
    pub async fn close(&self) -> Result<Option<SessionStatus>, SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let child = Arc::clone(&self.child);
        let writer = Arc::clone(&self.writer);
        let master = Arc::clone(&self.master);
        let pid = self.pid;

        // Kill first: a write blocked on a full PTY holds the writer lock
        // and only returns once the shell is gone.
        let status = tokio::task::spawn_blocking(move || {
            hang_up(pid);
            let status = reap(&mut **lock(&child));
            lock(&writer).take();
            lock(&master).take();
            status
        })
        .await
        .map_err(|e| SessionError::KillFailed(e.to_string()))??;

        tracing::info!(
            session_id = %self.id,
            status = ?status,
            "Session closed"
        );

        Ok(Some(status))
    }

    /// Checks if the child process has exited without waiting.
    pub fn try_wait(&self) -> Result<Option<SessionStatus>, SessionError> {
        let mut child = lock(&self.child);
        match child.try_wait() {
            Ok(Some(status)) => Ok(Some(SessionStatus::Exited(status.exit_code() as i32))),
            Ok(None) => Ok(None),
            Err(e) => Err(SessionError::Io(e)),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            hang_up(self.pid);
            let _ = reap(&mut **lock(&self.child));
            tracing::debug!(session_id = %self.id, "Reaped abandoned session");
        }
    }
}

/// Hangs up every process group in the shell's terminal session.
///
/// The shell is the session leader, so its pid is also the session id and
/// the pgid of jobs started without job control. Jobs that ignore SIGHUP
/// keep the slave open and the reader blocked, hence the SIGKILL.
fn hang_up(pid: Option<u32>) {
    let Some(sid) = pid.and_then(|pid| i32::try_from(pid).ok()).filter(|&pid| pid > 1) else {
        return;
    };

    let groups = session_groups(sid);
    for signal in [Signal::SIGHUP, Signal::SIGKILL] {
        for &pgid in &groups {
            if let Err(e) = killpg(Pid::from_raw(pgid), signal) {
                tracing::trace!(pgid, signal = ?signal, error = %e, "Process group signal failed");
            }
        }
    }
}

/// Process groups belonging to terminal session `sid`, the shell's own first.
fn session_groups(sid: i32) -> Vec<i32> {
    let mut groups = vec![sid];

    // Jobs under job control get their own group inside the session.
    #[cfg(target_os = "linux")]
    if let Ok(entries) = std::fs::read_dir("/proc") {
        for entry in entries.flatten() {
            let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some((pgrp, session)) = parse_stat_ids(&stat) {
                if session == sid && pgrp > 1 && !groups.contains(&pgrp) {
                    groups.push(pgrp);
                }
            }
        }
    }

    groups
}

/// Extracts `(pgrp, session)` from a `/proc/<pid>/stat` line.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_stat_ids(stat: &str) -> Option<(i32, i32)> {
    // The command name may contain spaces and parens; fields resume after
    // the last ')'. Order: state ppid pgrp session.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(2);
    let pgrp = fields.next()?.parse().ok()?;
    let session = fields.next()?.parse().ok()?;
    Some((pgrp, session))
}

/// Kills the child if it is still running and waits for it.
fn reap(child: &mut (dyn Child + Send + Sync)) -> Result<SessionStatus, SessionError> {
    if let Some(status) = child.try_wait()? {
        return Ok(SessionStatus::Exited(status.exit_code() as i32));
    }

    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "Kill failed, shell may have exited already");
    }

    let status = child
        .wait()
        .map_err(|e| SessionError::KillFailed(e.to_string()))?;
    Ok(SessionStatus::Exited(status.exit_code() as i32))
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
