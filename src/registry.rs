//! Process-wide registry of held locks, heartbeat threads, and the disposer
//! handed back to callers.
//!
//! The registry is not global state: each [`Locker`](crate::Locker) owns one,
//! so independent lock managers (and tests) stay isolated. It maps sentinel
//! paths to the currently-held lock for this process, and is what the exit
//! sweep enumerates.
//!
//! Each held lock gets a heartbeat: a small named thread that refreshes the
//! sentinel's mtime so other parties never judge the lock stale while we
//! hold it. The thread re-checks the registry before every touch and exits
//! as soon as its entry is gone or superseded, so a released lock can never
//! be resurrected by a straggling heartbeat. A thread (not an async task) is
//! used so the same mechanism serves both bindings and keeps ticking even
//! when no runtime exists.

use crate::engine;
use crate::fs::{StdFs, TokioFs};
use crate::retry::Attempts;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// One held lock. Dropping it closes the heartbeat channel, which stops the
/// heartbeat thread on its next wake-up.
struct HeldLock {
    id: u64,
    _stop: mpsc::Sender<()>,
}

/// Mapping from sentinel path to the lock this process currently holds on
/// it. At most one entry per sentinel; inserting over an existing entry
/// supersedes it.
pub(crate) struct Registry {
    held: Mutex<HashMap<PathBuf, HeldLock>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record a freshly-acquired lock and start its heartbeat. Returns the
    /// id that identifies this acquisition in the registry.
    ///
    /// A zero heartbeat interval (staleness recovery disabled) installs no
    /// heartbeat at all; there is no threshold to stay under.
    pub(crate) fn register(
        self: &Arc<Self>,
        lock_path: &Path,
        heartbeat_interval: Duration,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = mpsc::channel();
        self.held
            .lock()
            .unwrap()
            .insert(lock_path.to_path_buf(), HeldLock { id, _stop: stop_tx });
        if !heartbeat_interval.is_zero() {
            spawn_heartbeat(
                Arc::clone(self),
                lock_path.to_path_buf(),
                id,
                heartbeat_interval,
                stop_rx,
            );
        }
        id
    }

    /// Does the registry still map `lock_path` to this exact acquisition?
    pub(crate) fn holds(&self, lock_path: &Path, id: u64) -> bool {
        self.held
            .lock()
            .unwrap()
            .get(lock_path)
            .is_some_and(|held| held.id == id)
    }

    /// Remove the entry for `lock_path` only if it still carries `id`.
    /// Returns whether an entry was removed.
    pub(crate) fn remove_if(&self, lock_path: &Path, id: u64) -> bool {
        let mut held = self.held.lock().unwrap();
        if held.get(lock_path).is_some_and(|h| h.id == id) {
            held.remove(lock_path);
            true
        } else {
            false
        }
    }

    /// Remove the entry for `lock_path` regardless of owner. Returns whether
    /// an entry existed.
    pub(crate) fn remove(&self, lock_path: &Path) -> bool {
        self.held.lock().unwrap().remove(lock_path).is_some()
    }

    /// Remove every entry, stopping all heartbeats, and return the sentinel
    /// paths that were held.
    pub(crate) fn drain(&self) -> Vec<PathBuf> {
        let mut held = self.held.lock().unwrap();
        held.drain().map(|(path, _)| path).collect()
    }
}

fn spawn_heartbeat(
    registry: Arc<Registry>,
    lock_path: PathBuf,
    id: u64,
    interval: Duration,
    stop_rx: mpsc::Receiver<()>,
) {
    let spawned = thread::Builder::new()
        .name("dirlock-heartbeat".into())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if !registry.holds(&lock_path, id) {
                        break; // released or superseded
                    }
                    if let Err(error) = crate::fs::touch_now(&lock_path) {
                        // Best-effort only; never surfaced.
                        debug!(path = %lock_path.display(), %error, "heartbeat touch failed");
                    }
                }
                _ => break, // channel closed: entry was dropped
            }
        });
    if let Err(error) = spawned {
        warn!(%error, "failed to spawn heartbeat thread; lock may go stale");
    }
}

/// Disposer for a successfully acquired lock.
///
/// This is a weak capability: the lock itself lives in the registry, and the
/// handle merely knows how to release it. Calling release after the lock has
/// already been released or superseded is a safe no-op that reports `true`.
/// Dropping the handle does *not* release the lock — the lock stays held
/// until released explicitly or swept at process exit.
#[derive(Debug)]
pub struct LockHandle {
    registry: Weak<Registry>,
    lock_path: PathBuf,
    id: u64,
    attempts: Attempts,
    retry_interval: Duration,
}

impl LockHandle {
    pub(crate) fn new(
        registry: &Arc<Registry>,
        lock_path: PathBuf,
        id: u64,
        attempts: Attempts,
        retry_interval: Duration,
    ) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            lock_path,
            id,
            attempts,
            retry_interval,
        }
    }

    /// The sentinel path this handle guards.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock (non-blocking binding). Returns whether the sentinel
    /// is confirmed gone afterward.
    pub async fn release(&self) -> bool {
        if !self.detach() {
            return true;
        }
        engine::release_machine(&TokioFs, &self.lock_path, self.attempts, self.retry_interval)
            .await
    }

    /// Release the lock (blocking binding). Returns whether the sentinel is
    /// confirmed gone afterward.
    pub fn release_sync(&self) -> bool {
        if !self.detach() {
            return true;
        }
        futures::executor::block_on(engine::release_machine(
            &StdFs,
            &self.lock_path,
            self.attempts,
            self.retry_interval,
        ))
    }

    /// Drop the registry entry (stopping the heartbeat) if it is still ours.
    /// False means the lock was already released or superseded.
    fn detach(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove_if(&self.lock_path, self.id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_holds() {
        let registry = Arc::new(Registry::new());
        let path = PathBuf::from("/tmp/some.lock");

        let id = registry.register(&path, Duration::ZERO);
        assert!(registry.holds(&path, id));
        assert!(!registry.holds(&path, id + 1));
        assert!(!registry.holds(Path::new("/tmp/other.lock"), id));
    }

    #[test]
    fn test_reregistering_supersedes_the_old_entry() {
        let registry = Arc::new(Registry::new());
        let path = PathBuf::from("/tmp/some.lock");

        let first = registry.register(&path, Duration::ZERO);
        let second = registry.register(&path, Duration::ZERO);
        assert_ne!(first, second);
        assert!(!registry.holds(&path, first));
        assert!(registry.holds(&path, second));
    }

    #[test]
    fn test_remove_if_requires_matching_id() {
        let registry = Arc::new(Registry::new());
        let path = PathBuf::from("/tmp/some.lock");

        let id = registry.register(&path, Duration::ZERO);
        assert!(!registry.remove_if(&path, id + 7));
        assert!(registry.holds(&path, id));
        assert!(registry.remove_if(&path, id));
        assert!(!registry.holds(&path, id));
        // Second removal is a no-op.
        assert!(!registry.remove_if(&path, id));
    }

    #[test]
    fn test_drain_returns_all_held_paths() {
        let registry = Arc::new(Registry::new());
        registry.register(Path::new("/tmp/a.lock"), Duration::ZERO);
        registry.register(Path::new("/tmp/b.lock"), Duration::ZERO);

        let mut drained = registry.drain();
        drained.sort();
        assert_eq!(
            drained,
            vec![PathBuf::from("/tmp/a.lock"), PathBuf::from("/tmp/b.lock")]
        );
        assert!(registry.drain().is_empty());
    }

    #[test]
    fn test_heartbeat_refreshes_sentinel_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("beating.lock");
        std::fs::create_dir(&path).unwrap();
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let registry = Arc::new(Registry::new());
        let id = registry.register(&path, Duration::from_millis(20));

        thread::sleep(Duration::from_millis(120));
        let after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert!(after > before, "heartbeat should have touched the sentinel");

        // After removal the heartbeat must stop touching.
        assert!(registry.remove_if(&path, id));
        thread::sleep(Duration::from_millis(60));
        let settled = std::fs::metadata(&path).unwrap().modified().unwrap();
        thread::sleep(Duration::from_millis(60));
        let still = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(settled, still, "released lock must not be kept alive");
    }
}
