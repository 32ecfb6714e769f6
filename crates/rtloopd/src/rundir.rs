//! Runtime files shared by the daemon process and control-plane commands.
//!
//! `start`, `stop` and `status` run as separate short-lived processes, so
//! the daemon mirrors its shared state into a runtime directory:
//! - `rtloopd.pid` - PID of the daemon process, `flock`ed for its lifetime
//! - `rtloopd.status.json` - latest [`StatusSnapshot`]
//! - `rtloopd.stop` - PID a stop was requested for, until that process exits
//! - `rtloopd.log` - stdout/stderr of a daemonized process
//!
//! # Single Instance
//!
//! The lock on the PID file is the single-instance guard, not the PID it
//! contains. [`RunDir::acquire_pid_lock`] takes it before the daemon forks;
//! the forked child inherits the open file and with it the lock, which is
//! released only when the daemon exits. Stale files left by a process that
//! no longer exists are removed on read, and only while nobody holds the
//! lock.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use rtloop_core::{DaemonStatus, StatusSnapshot};
use tracing::debug;

use crate::error::ControlError;

/// Environment variable overriding the runtime directory.
pub const STATE_DIR_ENV_VAR: &str = "RTLOOP_STATE_DIR";

const PID_FILE: &str = "rtloopd.pid";
const STATUS_FILE: &str = "rtloopd.status.json";
const STOP_FILE: &str = "rtloopd.stop";
const LOG_FILE: &str = "rtloopd.log";

/// Attempts to lock a PID file whose path is unlinked while we open it.
const LOCK_ATTEMPTS: usize = 8;

/// Result of a `status` query.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: DaemonStatus,
    pub snapshot: Option<StatusSnapshot>,
}

/// Directory holding the daemon's runtime files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    dir: PathBuf,
}

impl RunDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$RTLOOP_STATE_DIR`, else `<state dir>/rtloop`, else `/tmp/rtloop`.
    pub fn from_env() -> Self {
        if let Ok(dir) = env::var(STATE_DIR_ENV_VAR) {
            // Daemonizing changes the working directory to /
            let dir = PathBuf::from(dir);
            return match env::current_dir() {
                Ok(cwd) if dir.is_relative() => Self::new(cwd.join(dir)),
                _ => Self::new(dir),
            };
        }
        let base = dirs::state_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        Self::new(base.join("rtloop"))
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join(PID_FILE)
    }

    pub fn status_file(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn stop_file(&self) -> PathBuf {
        self.dir.join(STOP_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Creates the directory if needed.
    pub fn ensure(&self) -> Result<(), ControlError> {
        fs::create_dir_all(&self.dir).map_err(|source| ControlError::RunFile {
            path: self.dir.clone(),
            source,
        })
    }

    // ------------------------------------------------------------------------
    // PID file
    // ------------------------------------------------------------------------

    /// Reads the PID from the PID file, if it exists.
    pub fn read_pid(&self) -> Option<u32> {
        let contents = fs::read_to_string(self.pid_file()).ok()?;
        contents.trim().parse().ok()
    }

    /// Takes the exclusive lock on the PID file and records this process.
    ///
    /// Creates the directory and the file as needed. Status and stop files
    /// left by an earlier daemon are removed once the lock is held.
    ///
    /// # Errors
    ///
    /// - `ControlError::AlreadyRunning` if another process holds the lock
    /// - `ControlError::RunFile` if the file cannot be opened, locked or written
    pub fn acquire_pid_lock(&self) -> Result<PidLock, ControlError> {
        self.ensure()?;
        let path = self.pid_file();
        let run_file = |source| ControlError::RunFile {
            path: path.clone(),
            source,
        };

        for _ in 0..LOCK_ATTEMPTS {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(run_file)?;

            match try_lock_exclusive(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(ControlError::AlreadyRunning)
                }
                Err(e) => return Err(run_file(e)),
            }

            // Stale cleanup may have unlinked the file we opened
            if !is_same_file(&file, &path).map_err(run_file)? {
                continue;
            }

            let _ = fs::remove_file(self.status_file());
            let _ = fs::remove_file(self.stop_file());

            let lock = PidLock {
                file,
                path: path.clone(),
            };
            lock.record(std::process::id())?;
            return Ok(lock);
        }

        Err(run_file(io::Error::new(
            io::ErrorKind::Interrupted,
            "PID file kept being replaced while locking",
        )))
    }

    /// PID of a live daemon, removing files left by a dead one.
    ///
    /// Nothing is removed while the lock is held: a daemon that has just
    /// forked has not yet replaced its parent's PID.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read_pid()?;
        if is_process_running(pid) {
            return Some(pid);
        }

        match self.lock_existing() {
            Some(_lock) => {
                debug!(pid, "Removing stale runtime files");
                self.remove_files();
                None
            }
            None => self.read_pid().filter(|&pid| is_process_running(pid)),
        }
    }

    /// Removes the PID, status and stop files. Missing files are ignored.
    pub fn remove_files(&self) {
        let _ = fs::remove_file(self.pid_file());
        let _ = fs::remove_file(self.status_file());
        let _ = fs::remove_file(self.stop_file());
    }

    /// Locks the existing PID file, if it exists and nobody holds it.
    fn lock_existing(&self) -> Option<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.pid_file())
            .ok()?;
        try_lock_exclusive(&file).ok()?;
        Some(file)
    }

    // ------------------------------------------------------------------------
    // Stop marker
    // ------------------------------------------------------------------------

    /// PID a stop was requested for, if the marker exists.
    pub fn read_stop_marker(&self) -> Option<u32> {
        let contents = fs::read_to_string(self.stop_file()).ok()?;
        contents.trim().parse().ok()
    }

    fn write_stop_marker(&self, pid: u32) -> Result<(), ControlError> {
        let path = self.stop_file();
        fs::write(&path, pid.to_string()).map_err(|source| ControlError::RunFile { path, source })
    }

    // ------------------------------------------------------------------------
    // Status snapshot
    // ------------------------------------------------------------------------

    /// Writes the snapshot via a temporary file and rename, so readers
    /// never observe a partial document.
    pub fn write_snapshot(&self, snapshot: &StatusSnapshot) -> Result<(), ControlError> {
        self.ensure()?;
        let path = self.status_file();
        let tmp = path.with_extension("json.tmp");
        let contents = snapshot
            .encode()
            .map_err(|e| ControlError::RunFile {
                path: path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            })?;
        fs::write(&tmp, contents).map_err(|source| ControlError::RunFile {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| ControlError::RunFile { path, source })
    }

    pub fn read_snapshot(&self) -> Option<StatusSnapshot> {
        let contents = fs::read_to_string(self.status_file()).ok()?;
        StatusSnapshot::decode(&contents).ok()
    }

    // ------------------------------------------------------------------------
    // Control-plane queries
    // ------------------------------------------------------------------------

    /// Status of the daemon owning this directory.
    ///
    /// A stop marker naming the live PID means exiting, whatever the last
    /// snapshot says. A live PID without a matching snapshot counts as
    /// running: the daemon writes its PID before it publishes the first
    /// snapshot.
    pub fn query_status(&self) -> StatusReport {
        let Some(pid) = self.running_pid() else {
            return StatusReport {
                status: DaemonStatus::NotStarted,
                snapshot: None,
            };
        };

        let snapshot = self.read_snapshot().filter(|snapshot| snapshot.pid == pid);
        let status = if self.read_stop_marker() == Some(pid) {
            DaemonStatus::Exiting
        } else {
            snapshot
                .as_ref()
                .map_or(DaemonStatus::Running, StatusSnapshot::status)
        };

        StatusReport { status, snapshot }
    }

    /// Asks a running daemon to stop by sending SIGTERM.
    ///
    /// The stop marker is written before the signal, so a `status` issued
    /// right after this returns reports exiting. Returns the PID signalled,
    /// or `None` if no daemon was running. Does not wait for the daemon to
    /// exit.
    pub fn request_stop(&self) -> Result<Option<u32>, ControlError> {
        let Some(pid) = self.running_pid() else {
            return Ok(None);
        };
        self.write_stop_marker(pid)?;
        if let Err(e) = send_terminate(pid) {
            let _ = fs::remove_file(self.stop_file());
            return Err(e);
        }
        Ok(Some(pid))
    }
}

// ============================================================================
// PID Lock
// ============================================================================

/// Exclusive lock on the PID file, held for the daemon's lifetime.
///
/// The lock is released when the last copy of the open file is closed, so a
/// forked child keeps it after the parent exits.
#[derive(Debug)]
pub struct PidLock {
    file: File,
    path: PathBuf,
}

impl PidLock {
    /// Replaces the recorded PID, e.g. with the forked child's.
    pub fn record(&self, pid: u32) -> Result<(), ControlError> {
        let run_file = |source| ControlError::RunFile {
            path: self.path.clone(),
            source,
        };
        self.file.set_len(0).map_err(run_file)?;
        write_at_start(&self.file, pid.to_string().as_bytes()).map_err(run_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, _path: &Path) -> io::Result<bool> {
    Ok(true)
}

#[cfg(unix)]
fn write_at_start(file: &File, contents: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.write_all_at(contents, 0)
}

#[cfg(not(unix))]
fn write_at_start(mut file: &File, contents: &[u8]) -> io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};

    file.seek(SeekFrom::Start(0))?;
    file.write_all(contents)
}

/// Checks if a process with the given PID is running.
pub fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> Result<(), ControlError> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| ControlError::Signal {
        pid,
        source: io::Error::from(io::ErrorKind::InvalidInput),
    })?;
    // SAFETY: kill has no memory-safety preconditions.
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc != 0 {
        return Err(ControlError::Signal {
            pid,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_terminate(pid: u32) -> Result<(), ControlError> {
    Err(ControlError::Signal {
        pid,
        source: io::Error::from(io::ErrorKind::Unsupported),
    })
}
