// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The PID lock file guarding against two supervisors running against
//! the same backend set.

use fs2::FileExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another poolguardd instance already holds the lock at {0}")]
    AlreadyRunning(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Holds the exclusive lock on the lock file for the process lifetime.
/// Dropping it releases the lock (the OS does this on file close too,
/// but an explicit drop makes the lifetime visible at the call site).
pub struct PidLock {
    path: PathBuf,
    file: std::fs::File,
}

impl PidLock {
    /// Acquire the lock, then write the current pid. The file is opened
    /// without truncation and only truncated after the lock is held, so
    /// a failed acquisition never wipes the running daemon's PID.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|_| LockError::AlreadyRunning(path.to_path_buf()))?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poolguard.pid");
        let first = PidLock::acquire(&path).unwrap();
        let second = PidLock::acquire(&path);
        assert!(matches!(second, Err(LockError::AlreadyRunning(_))));
        drop(first);
        assert!(PidLock::acquire(&path).is_ok());
    }

    #[test]
    fn acquire_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poolguard.pid");
        let _lock = PidLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }
}
