//! Options for the lock, locked, and unlock operations.

use crate::retry::Attempts;
use crate::{DEFAULT_RETRY_INTERVAL, DEFAULT_STALE_THRESHOLD};
use std::path::PathBuf;
use std::time::Duration;

/// Options for acquiring a lock.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Explicit sentinel path. When set, the target path is not
    /// canonicalized and may not even exist.
    pub lock_path: Option<PathBuf>,

    /// Retry budget for the acquisition attempt.
    pub attempts: Attempts,

    /// Delay between attempts.
    pub retry_interval: Duration,

    /// Age beyond which a foreign sentinel is considered stale and may be
    /// reclaimed. Zero disables staleness recovery entirely.
    pub stale_threshold: Duration,

    /// How often the holder refreshes the sentinel's mtime. Defaults to half
    /// the stale threshold when `None`.
    pub heartbeat_interval: Option<Duration>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            lock_path: None,
            attempts: Attempts::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            heartbeat_interval: None,
        }
    }
}

impl LockOptions {
    /// The effective heartbeat interval: the explicit value, or half the
    /// stale threshold.
    pub fn effective_heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
            .unwrap_or_else(|| self.stale_threshold / 2)
    }
}

/// Options for querying whether a lock is currently held.
#[derive(Debug, Clone)]
pub struct LockedOptions {
    /// Explicit sentinel path, bypassing canonicalization.
    pub lock_path: Option<PathBuf>,

    /// Retry budget for the check.
    pub attempts: Attempts,

    /// Delay between attempts.
    pub retry_interval: Duration,

    /// Age beyond which an existing sentinel reads as non-live. Zero means
    /// every existing sentinel reads as non-live.
    pub stale_threshold: Duration,
}

impl Default for LockedOptions {
    fn default() -> Self {
        Self {
            lock_path: None,
            attempts: Attempts::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }
}

/// Options for releasing a lock.
#[derive(Debug, Clone)]
pub struct UnlockOptions {
    /// Explicit sentinel path, bypassing canonicalization.
    pub lock_path: Option<PathBuf>,

    /// Retry budget for the removal.
    pub attempts: Attempts,

    /// Delay between attempts.
    pub retry_interval: Duration,
}

impl Default for UnlockOptions {
    fn default() -> Self {
        Self {
            lock_path: None,
            attempts: Attempts::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}
