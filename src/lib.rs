//! `dirlock` — Advisory inter-process file locking via atomic directory
//! creation.
//!
//! A lock on a target path is a sentinel *directory* (by default the
//! canonical target path with `.lock` appended): creating it atomically
//! acquires the lock, and its existence is the lock. A live holder keeps the
//! sentinel's mtime fresh with a background heartbeat; a sentinel whose
//! mtime is older than the stale threshold is treated as abandoned and may
//! be reclaimed by anyone.
//!
//! Every operation exists in a non-blocking (tokio) and a blocking form:
//!
//! ```no_run
//! use dirlock::LockOptions;
//!
//! let options = LockOptions::default();
//! if let Some(handle) = dirlock::lock_sync("some/file", &options).unwrap() {
//!     // exclusive access to some/file across processes
//!     handle.release_sync();
//! }
//! ```
//!
//! Acquisition failure is not an error: a `None` outcome means the retry
//! budget ran out against a live foreign lock (or persistent transient I/O
//! failures) — indistinguishable, by design, from a holder that never freed
//! the lock in time. Only precondition violations error: a target path that
//! cannot be canonicalized (and no explicit `lock_path` given), or a
//! sentinel whose parent directory is missing.
//!
//! Locks held through the process-default locker are swept (heartbeats
//! stopped, sentinels removed best-effort) when the process exits normally.
//! No fairness is guaranteed among waiters; this is not a distributed lock
//! service and provides no fencing tokens.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

mod engine;
mod error;
mod fs;
mod locker;
mod options;
mod registry;
mod retry;

pub use engine::LOCK_SUFFIX;
pub use error::{LockError, Result};
pub use locker::Locker;
pub use options::{LockOptions, LockedOptions, UnlockOptions};
pub use registry::LockHandle;
pub use retry::Attempts;

/// Default number of delayed retries per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay between retries.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Default age beyond which a sentinel is considered stale.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(10);

/// Retry budget used by the process-exit sweep.
pub(crate) const EXIT_SWEEP_ATTEMPTS: u32 = 20;

/// Retry delay used by the process-exit sweep.
pub(crate) const EXIT_SWEEP_RETRY_INTERVAL: Duration = Duration::from_millis(3);

static DEFAULT_LOCKER: OnceLock<Locker> = OnceLock::new();

/// The process-default [`Locker`], created on first use. Locks acquired
/// through it are released by the exit sweep.
pub fn default_locker() -> &'static Locker {
    DEFAULT_LOCKER.get_or_init(|| {
        install_exit_hook();
        Locker::new()
    })
}

/// Acquire a lock on `target` with the process-default locker.
pub async fn lock(
    target: impl AsRef<Path>,
    options: &LockOptions,
) -> Result<Option<LockHandle>> {
    default_locker().lock(target, options).await
}

/// Blocking form of [`lock`].
pub fn lock_sync(target: impl AsRef<Path>, options: &LockOptions) -> Result<Option<LockHandle>> {
    default_locker().lock_sync(target, options)
}

/// Query whether a live lock exists on `target`.
pub async fn is_locked(
    target: impl AsRef<Path>,
    options: &LockedOptions,
) -> Result<Option<bool>> {
    default_locker().is_locked(target, options).await
}

/// Blocking form of [`is_locked`].
pub fn is_locked_sync(target: impl AsRef<Path>, options: &LockedOptions) -> Result<Option<bool>> {
    default_locker().is_locked_sync(target, options)
}

/// Release the lock on `target` with the process-default locker.
pub async fn unlock(target: impl AsRef<Path>, options: &UnlockOptions) -> Result<bool> {
    default_locker().unlock(target, options).await
}

/// Blocking form of [`unlock`].
pub fn unlock_sync(target: impl AsRef<Path>, options: &UnlockOptions) -> Result<bool> {
    default_locker().unlock_sync(target, options)
}

/// Release every lock still held by the process-default locker.
pub fn release_all_sync() {
    if let Some(locker) = DEFAULT_LOCKER.get() {
        locker.release_all_sync();
    }
}

#[cfg(unix)]
fn install_exit_hook() {
    extern "C" fn sweep_at_exit() {
        if let Some(locker) = DEFAULT_LOCKER.get() {
            locker.release_all_sync();
        }
    }
    // Registration can only fail when the atexit table is full, in which
    // case the locks are simply left for staleness recovery.
    let _ = unsafe { libc::atexit(sweep_at_exit) };
}

#[cfg(not(unix))]
fn install_exit_hook() {}
