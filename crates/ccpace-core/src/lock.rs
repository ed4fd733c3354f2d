//! Single-instance lock file.
//!
//! The lock is a plain file holding the owner's PID, created with
//! `O_CREAT|O_EXCL`. A lock whose owner process is gone is reclaimed at once.
//! A lock with a live owner is never reclaimed. When the owner cannot be read
//! the mtime decides: older than the staleness limit means abandoned.
//! Owners call [`UsageLock::touch`] before every capture and while idle so
//! the mtime stays fresh.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::capture::UsageSource;
use crate::config::Tunables;
use crate::error::{CaptureError, LockError};

/// Held lock; removed on drop
#[derive(Debug)]
pub struct UsageLock {
    path: PathBuf,
}

impl UsageLock {
    /// Acquire the lock, reclaiming it if the current holder went stale
    pub fn acquire(path: impl Into<PathBuf>, stale_after: Duration) -> Result<Self, LockError> {
        let path = path.into();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(io_err)?;
            }
        }

        match create_exclusive(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_err(e)),
        }

        if !is_stale(&path, stale_after) {
            return Err(LockError::Held { path });
        }

        warn!("Reclaiming stale lock {:?}", path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        // Another instance may win the race between remove and create
        match create_exclusive(&path) {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(LockError::Held { path }),
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Refresh the lock's mtime
    pub fn touch(&self) -> Result<(), LockError> {
        let io_err = |source| LockError::Io {
            path: self.path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.set_modified(SystemTime::now()).map_err(io_err)
    }
}

impl Drop for UsageLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                debug!("Failed to remove lock {:?}: {}", self.path, e);
            }
        }
    }
}

/// Usage source that refreshes the lock before every capture
pub struct LockedSource<'a, S> {
    inner: S,
    lock: &'a UsageLock,
}

impl<'a, S> LockedSource<'a, S> {
    pub fn new(inner: S, lock: &'a UsageLock) -> Self {
        Self { inner, lock }
    }
}

impl<S: UsageSource> UsageSource for LockedSource<'_, S> {
    fn capture(&mut self, tunables: &Tunables) -> Result<String, CaptureError> {
        if let Err(e) = self.lock.touch() {
            warn!("Failed to refresh lock: {}", e);
        }
        self.inner.capture(tunables)
    }
}

fn create_exclusive(path: &Path) -> std::io::Result<()> {
    let mut file: File = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

/// PID recorded in the lock file, if readable
fn lock_owner(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether a process with this PID exists (EPERM still means it exists)
fn owner_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    match lock_owner(path) {
        Some(pid) if owner_alive(pid) => {
            debug!("Lock {:?} owned by live process {}", path, pid);
            return false;
        }
        Some(pid) => {
            debug!("Lock {:?} owner {} is gone", path, pid);
            return true;
        }
        None => {}
    }

    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        // Vanished between the create attempt and now
        Err(_) => return true,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}
