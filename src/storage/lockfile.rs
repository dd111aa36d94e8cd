//! Single-instance guard for a state directory.
//!
//! Two watchdogs sharing one sled directory would both restart the same
//! units and double every alert, so the second one refuses to start.

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// PID file held for the lifetime of the watchdog.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".watchkeeper.lock";

    /// Take the lock in `state_dir`, creating the directory if needed.
    ///
    /// A lock left behind by a dead process is replaced.
    pub fn acquire<P: AsRef<Path>>(state_dir: P) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create state directory: {}", state_dir.display()))?;

        let lock_path = state_dir.join(Self::LOCK_FILE_NAME);
        let pid = std::process::id();

        // The lock only ever appears via an exclusive link; of two racing
        // instances exactly one wins.
        let mut replaced_stale = false;
        while !Self::create_exclusive(&lock_path, pid)? {
            match Self::holder_pid(&lock_path) {
                Some(holder) if holder != pid && Self::is_watchdog_running(holder) => {
                    bail!(
                        "Another watchkeeper instance is already running (PID: {holder})\n\
                         Stop it, or remove the stale lock file: rm {}",
                        lock_path.display()
                    );
                }
                _ if replaced_stale => {
                    bail!(
                        "Lock file {} was taken by another instance during startup",
                        lock_path.display()
                    );
                }
                Some(holder) => tracing::info!(pid = holder, "Replacing stale lock file"),
                None => tracing::warn!(path = %lock_path.display(), "Unreadable lock file, replacing"),
            }
            match fs::remove_file(&lock_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to remove stale lock file: {}", lock_path.display())
                    })
                }
            }
            replaced_stale = true;
        }
        tracing::debug!(pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// Create the lock file only if absent. `Ok(false)` when it already exists.
    ///
    /// The PID is written to a private file first and hard-linked into place,
    /// so the lock never exists without its content.
    fn create_exclusive(lock_path: &Path, pid: u32) -> Result<bool> {
        let staging = lock_path.with_extension(format!("{pid}.tmp"));
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .with_context(|| format!("Failed to create lock file: {}", staging.display()))?;
        writeln!(file, "{pid}")
            .with_context(|| format!("Failed to write lock file: {}", staging.display()))?;
        drop(file);

        let linked = fs::hard_link(&staging, lock_path);
        let _ = fs::remove_file(&staging);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to create lock file: {}", lock_path.display())),
        }
    }

    /// PID recorded in an existing lock file.
    fn holder_pid(lock_path: &Path) -> Option<u32> {
        fs::read_to_string(lock_path).ok()?.trim().parse().ok()
    }

    #[cfg(unix)]
    fn is_watchdog_running(pid: u32) -> bool {
        // A recycled PID belonging to another program does not count
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("watchkeeper"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_watchdog_running(_pid: u32) -> bool {
        true
    }

    pub fn release(&mut self) {
        if !self.owned {
            return;
        }
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!(error = %e, "Failed to remove lock file");
        }
        self.owned = false;
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_records_own_pid_and_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = {
            let lock = ProcessLock::acquire(dir.path()).unwrap();
            let pid: u32 = fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
            assert_eq!(pid, std::process::id());
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn dead_holder_is_replaced() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ProcessLock::LOCK_FILE_NAME), "999999999\n").unwrap();
        let lock = ProcessLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn garbage_lock_is_replaced() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(ProcessLock::LOCK_FILE_NAME), "not-a-pid").unwrap();
        assert!(ProcessLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn existing_lock_file_is_never_overwritten_by_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ProcessLock::LOCK_FILE_NAME);
        assert!(ProcessLock::create_exclusive(&path, 111).unwrap());
        assert!(!ProcessLock::create_exclusive(&path, 222).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "111");
    }
}
