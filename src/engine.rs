//! The acquire, liveness-query, and release state machines.
//!
//! Each machine is written once, generic over [`LockFs`], and driven by a
//! [`RetryBudget`]. The blocking and non-blocking public entry points differ
//! only in which binding they pass in and how they drive the future.
//!
//! Error policy: ordinary contention (`AlreadyExists`) and transient I/O
//! failures never escalate — they spend the retry budget and resolve to an
//! absent outcome. Canonicalization failures and structural sentinel
//! failures (missing parent directory) escalate immediately in both
//! bindings.

use crate::error::{LockError, Result};
use crate::fs::LockFs;
use crate::options::{LockOptions, LockedOptions};
use crate::registry::{LockHandle, Registry};
use crate::retry::{Attempts, RetryBudget};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Suffix appended to the canonical target path to form the default
/// sentinel path.
pub const LOCK_SUFFIX: &str = ".lock";

/// Resolve the sentinel path for a target: an explicit override wins,
/// otherwise the canonicalized target with [`LOCK_SUFFIX`] appended.
pub(crate) async fn resolve_lock_path<F: LockFs>(
    fs: &F,
    target: &Path,
    lock_path: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(lock_path) = lock_path {
        return Ok(lock_path.to_path_buf());
    }
    let canonical =
        fs.canonicalize(target)
            .await
            .map_err(|source| LockError::TargetUnresolvable {
                path: target.to_path_buf(),
                source,
            })?;
    let mut raw = canonical.into_os_string();
    raw.push(LOCK_SUFFIX);
    Ok(PathBuf::from(raw))
}

/// Time since `mtime`, clamped to zero if the clock reads earlier than the
/// sentinel's timestamp.
fn elapsed_since(mtime: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(mtime)
        .unwrap_or(Duration::ZERO)
}

/// Attempt to acquire the lock for `target`.
///
/// `Ok(Some(handle))` on success, `Ok(None)` when the budget is exhausted
/// against a live foreign lock or persistent transient failures.
pub(crate) async fn acquire_machine<F: LockFs>(
    fs: &F,
    registry: &Arc<Registry>,
    target: &Path,
    options: &LockOptions,
) -> Result<Option<LockHandle>> {
    let lock_path = resolve_lock_path(fs, target, options.lock_path.as_deref()).await?;
    let mut budget = RetryBudget::new(options.attempts);

    loop {
        match fs.create_dir(&lock_path).await {
            Ok(()) => {
                let id = registry.register(&lock_path, options.effective_heartbeat_interval());
                debug!(path = %lock_path.display(), "lock acquired");
                return Ok(Some(LockHandle::new(
                    registry,
                    lock_path,
                    id,
                    options.attempts,
                    options.retry_interval,
                )));
            }
            Err(error)
                if error.kind() == io::ErrorKind::AlreadyExists
                    && !options.stale_threshold.is_zero() =>
            {
                match fs.modified(&lock_path).await {
                    Ok(mtime) if elapsed_since(mtime) >= options.stale_threshold => {
                        // Holder stopped heartbeating; reclaim and try again
                        // without spending an attempt. A removal that itself
                        // fails (sentinel wedged, e.g. not empty) spends the
                        // budget like contention, so a bounded acquire still
                        // terminates.
                        debug!(path = %lock_path.display(), "clearing stale lock");
                        match fs.remove_dir(&lock_path).await {
                            Ok(()) => {}
                            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                            Err(_) => {
                                if budget.is_last() {
                                    return Ok(None);
                                }
                                fs.sleep(options.retry_interval).await;
                                budget.consume();
                            }
                        }
                    }
                    _ => {
                        // Live lock, or the inspection itself failed.
                        if budget.is_last() {
                            return Ok(None);
                        }
                        fs.sleep(options.retry_interval).await;
                        budget.consume();
                    }
                }
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                // The sentinel's parent directory is missing. Structural;
                // retrying cannot help.
                return Err(LockError::SentinelUnusable {
                    path: lock_path,
                    source,
                });
            }
            Err(_) => {
                if budget.is_last() {
                    return Ok(None);
                }
                fs.sleep(options.retry_interval).await;
                budget.consume();
            }
        }
    }
}

/// Query whether a live (non-stale) sentinel exists for `target`.
///
/// `Ok(Some(bool))` is conclusive; `Ok(None)` means the check could not be
/// completed within the budget. Never mutates the filesystem.
pub(crate) async fn locked_machine<F: LockFs>(
    fs: &F,
    target: &Path,
    options: &LockedOptions,
) -> Result<Option<bool>> {
    let lock_path = resolve_lock_path(fs, target, options.lock_path.as_deref()).await?;
    let mut budget = RetryBudget::new(options.attempts);

    loop {
        match fs.modified(&lock_path).await {
            Ok(mtime) => {
                return Ok(Some(elapsed_since(mtime) <= options.stale_threshold));
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                // Absence is conclusive.
                return Ok(Some(false));
            }
            Err(_) => {
                if budget.is_last() {
                    return Ok(None);
                }
                fs.sleep(options.retry_interval).await;
                budget.consume();
            }
        }
    }
}

/// Remove the sentinel at `lock_path`.
///
/// `true` when the sentinel is confirmed gone (removed now, or already
/// absent), `false` when removal could not be confirmed within the budget.
pub(crate) async fn release_machine<F: LockFs>(
    fs: &F,
    lock_path: &Path,
    attempts: Attempts,
    retry_interval: Duration,
) -> bool {
    let mut budget = RetryBudget::new(attempts);

    loop {
        match fs.remove_dir(lock_path).await {
            Ok(()) => {
                debug!(path = %lock_path.display(), "lock released");
                return true;
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return true;
            }
            Err(_) => {
                if budget.is_last() {
                    return false;
                }
                fs.sleep(retry_interval).await;
                budget.consume();
            }
        }
    }
}
