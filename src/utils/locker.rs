//! File-based locking so two backup runs never interleave staging and commit

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive lock over a backup directory, held for the duration of a run.
pub struct RunLock {
    guard: ManuallyDrop<RwLockWriteGuard<'static, File>>,
    lock: *mut RwLock<File>,
    lock_path: PathBuf,
}

// The raw pointer is only touched in Drop, after the guard is gone.
unsafe impl Send for RunLock {}

impl RunLock {
    /// Acquire an exclusive lock for the given backup directory.
    /// Fails immediately if another run already holds it.
    pub fn acquire(backup_dir: &Path) -> Result<Self> {
        let lock_path = backup_dir.join(".netstash.lock");

        debug!("Attempting to acquire run lock: {:?}", lock_path);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .context(format!("Failed to open lock file: {:?}", lock_path))?;

        // The guard borrows the RwLock, so the lock has to outlive it. Leaking
        // the box pins the RwLock for the guard's lifetime; Drop drops the
        // guard first and then reclaims the allocation.
        let lock: *mut RwLock<File> = Box::into_raw(Box::new(RwLock::new(file)));
        let guard = match unsafe { (*lock).try_write() } {
            Ok(guard) => guard,
            Err(e) => {
                unsafe { drop(Box::from_raw(lock)) };
                return Err(anyhow::anyhow!(e)).context(format!(
                    "Another backup run is already in progress (lock held at {:?})",
                    lock_path
                ));
            }
        };

        info!("Acquired run lock: {:?}", lock_path);

        Ok(Self {
            guard: ManuallyDrop::new(guard),
            lock,
            lock_path,
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.guard);
            drop(Box::from_raw(self.lock));
        }
        debug!("Released run lock: {:?}", self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let first = RunLock::acquire(dir.path()).unwrap();
        assert!(RunLock::acquire(dir.path()).is_err());
        drop(first);
        assert!(RunLock::acquire(dir.path()).is_ok());
    }
}
