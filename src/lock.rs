//! Exclusive store lock.
//!
//! Mutual exclusion comes from an OS advisory lock (`fs2`) on `state/lock`, so
//! only one handle can hold it and a crashed holder releases it with its
//! process. The file body records the holder pid and a lease for diagnostics.
//! A clean release empties the body; a body left behind by a lock nobody holds
//! marks a crashed writer and triggers recovery on the next open.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::store::paths::STATE_DIR;

const LOCK_FILE: &str = "lock";
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Contents of the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
}

/// What is currently on disk at the lock path.
#[derive(Debug)]
pub enum LockState {
    Free,
    /// Another handle holds the OS lock. The body may be mid-write.
    Held(Option<LockInfo>),
    /// Nobody holds the lock but a holder's body was left behind.
    Stale(Option<LockInfo>),
}

/// Held store lock. Released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
    lease: Duration,
    acquired_at: DateTime<Utc>,
}

impl StoreLock {
    /// Acquire the lock, polling for up to `wait` before failing with
    /// [`StoreError::StoreBusy`]. A body left by a crashed holder is overwritten.
    pub fn acquire(root: &Path, wait: Duration, lease: Duration) -> Result<Self> {
        let path = lock_path(root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = open_lock_file(&path, true)?;

        let deadline = Instant::now() + wait;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        let info = read_info(&path);
                        return Err(StoreError::StoreBusy {
                            holder_pid: info.as_ref().map_or(0, |i| i.pid),
                            since: info
                                .map(|i| i.acquired_at.to_rfc3339())
                                .unwrap_or_else(|| "unknown".into()),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }

        if let Some(previous) = read_info(&path) {
            tracing::warn!(holder = previous.pid, "previous holder did not release the store lock");
        }
        let lock = Self {
            file,
            path,
            lease,
            acquired_at: Utc::now(),
        };
        lock.write_body()?;
        tracing::debug!(path = %lock.path.display(), "store lock acquired");
        Ok(lock)
    }

    /// Extend the lease from now. Long-running holders call this between steps.
    pub fn renew(&self) -> Result<()> {
        self.write_body()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the body in place. Replacing the file would detach the OS lock
    /// from the path other handles open.
    fn write_body(&self) -> Result<()> {
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: self.acquired_at,
            lease_expires_at: lease_end(self.lease),
        };
        let body = serde_json::to_vec(&info)?;
        let rewrite = |mut file: &File| -> std::io::Result<()> {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&body)?;
            file.sync_data()
        };
        rewrite(&self.file).map_err(|e| StoreError::io(&self.path, e))
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Still under our own OS lock here, so the body cleared is ours.
        if let Err(e) = self.file.set_len(0) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to clear store lock");
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}

/// Inspect the lock without keeping it.
pub fn inspect(root: &Path) -> Result<LockState> {
    let path = lock_path(root);
    let Some(file) = open_existing(&path)? else {
        return Ok(LockState::Free);
    };
    match file.try_lock_exclusive() {
        Ok(()) => {
            let state = match read_body(&path) {
                None => LockState::Free,
                Some(bytes) => LockState::Stale(serde_json::from_slice(&bytes).ok()),
            };
            FileExt::unlock(&file).map_err(|e| StoreError::io(&path, e))?;
            Ok(state)
        }
        Err(e) if is_contended(&e) => Ok(LockState::Held(read_info(&path))),
        Err(e) => Err(StoreError::io(&path, e)),
    }
}

/// Empty a stale lock body. Does nothing while the lock is held.
pub fn clear(root: &Path) -> Result<()> {
    let path = lock_path(root);
    let Some(file) = open_existing(&path)? else {
        return Ok(());
    };
    match file.try_lock_exclusive() {
        Ok(()) => {
            file.set_len(0).map_err(|e| StoreError::io(&path, e))?;
            FileExt::unlock(&file).map_err(|e| StoreError::io(&path, e))
        }
        Err(e) if is_contended(&e) => Ok(()),
        Err(e) => Err(StoreError::io(&path, e)),
    }
}

fn lock_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(LOCK_FILE)
}

fn open_lock_file(path: &Path, create: bool) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(create)
        .truncate(false)
        .open(path)
        .map_err(|e| StoreError::io(path, e))
}

fn open_existing(path: &Path) -> Result<Option<File>> {
    match open_lock_file(path, false) {
        Ok(file) => Ok(Some(file)),
        Err(StoreError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Non-empty body, if any.
fn read_body(path: &Path) -> Option<Vec<u8>> {
    fs::read(path).ok().filter(|bytes| !bytes.is_empty())
}

fn read_info(path: &Path) -> Option<LockInfo> {
    serde_json::from_slice(&read_body(path)?).ok()
}

fn lease_end(lease: Duration) -> DateTime<Utc> {
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::seconds(60));
    Utc::now() + lease
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_millis(100);
    const LEASE: Duration = Duration::from_secs(60);

    fn write_body(root: &Path, body: &[u8]) {
        let path = lock_path(root);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
    }

    fn expired_body() -> Vec<u8> {
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now() - chrono::Duration::minutes(10),
            lease_expires_at: Utc::now() - chrono::Duration::minutes(5),
        };
        serde_json::to_vec(&info).unwrap()
    }

    #[test]
    fn second_acquire_reports_busy() {
        let tmp = TempDir::new().unwrap();
        let _held = StoreLock::acquire(tmp.path(), WAIT, LEASE).unwrap();

        let err = StoreLock::acquire(tmp.path(), WAIT, LEASE).unwrap_err();
        match err {
            StoreError::StoreBusy { holder_pid, .. } => assert_eq!(holder_pid, std::process::id()),
            other => panic!("expected StoreBusy, got {other:?}"),
        }
    }

    #[test]
    fn drop_releases() {
        let tmp = TempDir::new().unwrap();
        {
            let _held = StoreLock::acquire(tmp.path(), WAIT, LEASE).unwrap();
            assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Held(Some(_))));
        }
        assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Free));
        StoreLock::acquire(tmp.path(), WAIT, LEASE).unwrap();
    }

    #[test]
    fn leftover_body_is_stale_and_taken_over() {
        let tmp = TempDir::new().unwrap();
        write_body(tmp.path(), &expired_body());

        assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Stale(Some(_))));
        let _lock = StoreLock::acquire(tmp.path(), WAIT, LEASE).unwrap();
        assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Held(Some(_))));
    }

    #[test]
    fn garbage_lock_file_is_stale() {
        let tmp = TempDir::new().unwrap();
        write_body(tmp.path(), b"{not json");
        assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Stale(None)));
        clear(tmp.path()).unwrap();
        assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Free));
    }

    #[test]
    fn clear_leaves_a_held_lock_alone() {
        let tmp = TempDir::new().unwrap();
        let _held = StoreLock::acquire(tmp.path(), WAIT, LEASE).unwrap();
        clear(tmp.path()).unwrap();
        assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Held(Some(_))));
    }

    #[test]
    fn stale_takeover_admits_one_holder() {
        let tmp = TempDir::new().unwrap();
        write_body(tmp.path(), &expired_body());

        let holders = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let lock = StoreLock::acquire(tmp.path(), Duration::from_secs(10), LEASE).unwrap();
                        let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::yield_now();
                        holders.fetch_sub(1, Ordering::SeqCst);
                        drop(lock);
                    }
                });
            }
        });

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(matches!(inspect(tmp.path()).unwrap(), LockState::Free));
    }

    #[test]
    fn renew_extends_lease_in_place() {
        let tmp = TempDir::new().unwrap();
        let lock = StoreLock::acquire(tmp.path(), WAIT, Duration::from_secs(1)).unwrap();
        let before = read_info(lock.path()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        lock.renew().unwrap();
        let after = read_info(lock.path()).unwrap();
        assert!(after.lease_expires_at > before.lease_expires_at);
        assert_eq!(after.acquired_at, before.acquired_at);

        // Still exclusive after the rewrite.
        assert!(StoreLock::acquire(tmp.path(), WAIT, LEASE).is_err());
    }
}
