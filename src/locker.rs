//! The lock facility: a registry-owning service exposing every operation in
//! blocking and non-blocking form.
//!
//! Each `Locker` owns its own registry, so independent lockers in one
//! process (or in tests) do not observe each other's held-lock bookkeeping —
//! though they still contend on the filesystem like any two processes would.
//! Most callers use the process-default instance via the crate-root
//! functions; constructing a `Locker` directly is for code that wants an
//! isolated exit-sweep scope.

use crate::engine;
use crate::error::Result;
use crate::fs::{StdFs, TokioFs};
use crate::options::{LockOptions, LockedOptions, UnlockOptions};
use crate::registry::{LockHandle, Registry};
use crate::retry::Attempts;
use futures::executor::block_on;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// An independent lock manager with its own held-lock registry.
pub struct Locker {
    registry: Arc<Registry>,
}

impl Locker {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
        }
    }

    /// Acquire a lock on `target` (non-blocking binding).
    ///
    /// `Ok(Some(handle))` on success; `Ok(None)` when the retry budget was
    /// exhausted against a live foreign lock or persistent transient
    /// failures. Errors only on precondition violations (unresolvable
    /// target, missing sentinel parent).
    pub async fn lock(
        &self,
        target: impl AsRef<Path>,
        options: &LockOptions,
    ) -> Result<Option<LockHandle>> {
        engine::acquire_machine(&TokioFs, &self.registry, target.as_ref(), options).await
    }

    /// Blocking form of [`lock`](Self::lock). Occupies the calling thread
    /// for the full duration of every attempt and delay.
    pub fn lock_sync(
        &self,
        target: impl AsRef<Path>,
        options: &LockOptions,
    ) -> Result<Option<LockHandle>> {
        block_on(engine::acquire_machine(
            &StdFs,
            &self.registry,
            target.as_ref(),
            options,
        ))
    }

    /// Query whether a live (non-stale) lock exists on `target`
    /// (non-blocking binding).
    ///
    /// `Ok(Some(true))` / `Ok(Some(false))` are conclusive; `Ok(None)` means
    /// the check could not be completed within the budget.
    pub async fn is_locked(
        &self,
        target: impl AsRef<Path>,
        options: &LockedOptions,
    ) -> Result<Option<bool>> {
        engine::locked_machine(&TokioFs, target.as_ref(), options).await
    }

    /// Blocking form of [`is_locked`](Self::is_locked).
    pub fn is_locked_sync(
        &self,
        target: impl AsRef<Path>,
        options: &LockedOptions,
    ) -> Result<Option<bool>> {
        block_on(engine::locked_machine(&StdFs, target.as_ref(), options))
    }

    /// Release the lock on `target` (non-blocking binding).
    ///
    /// Idempotent: `Ok(true)` whenever the sentinel no longer exists
    /// afterward, including when it never did. If this process holds the
    /// lock, its heartbeat is stopped first so the release cannot be undone
    /// by a straggling refresh.
    pub async fn unlock(
        &self,
        target: impl AsRef<Path>,
        options: &UnlockOptions,
    ) -> Result<bool> {
        let lock_path =
            engine::resolve_lock_path(&TokioFs, target.as_ref(), options.lock_path.as_deref())
                .await?;
        self.registry.remove(&lock_path);
        Ok(engine::release_machine(&TokioFs, &lock_path, options.attempts, options.retry_interval)
            .await)
    }

    /// Blocking form of [`unlock`](Self::unlock).
    pub fn unlock_sync(
        &self,
        target: impl AsRef<Path>,
        options: &UnlockOptions,
    ) -> Result<bool> {
        let lock_path = block_on(engine::resolve_lock_path(
            &StdFs,
            target.as_ref(),
            options.lock_path.as_deref(),
        ))?;
        self.registry.remove(&lock_path);
        Ok(block_on(engine::release_machine(
            &StdFs,
            &lock_path,
            options.attempts,
            options.retry_interval,
        )))
    }

    /// Best-effort release of every lock this locker still holds, blocking
    /// binding only. Used by the process-exit sweep, where the non-blocking
    /// binding cannot be relied upon to complete.
    pub fn release_all_sync(&self) {
        for lock_path in self.registry.drain() {
            debug!(path = %lock_path.display(), "releasing held lock in sweep");
            block_on(engine::release_machine(
                &StdFs,
                &lock_path,
                Attempts::Bounded(crate::EXIT_SWEEP_ATTEMPTS),
                crate::EXIT_SWEEP_RETRY_INTERVAL,
            ));
        }
    }
}

impl Default for Locker {
    fn default() -> Self {
        Self::new()
    }
}
