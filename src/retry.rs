//! Retry budget for lock operations.
//!
//! A plain value type that tracks how many delayed retries an operation has
//! left. The state machines in `engine` loop manually: a normal retry calls
//! `consume()` after sleeping, while a free retry (e.g. a stale sentinel was
//! just cleared and deserves an immediate second chance) simply loops again
//! without consuming. The budget has no knowledge of timing or I/O.

/// How many delayed retries an operation may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempts {
    /// Up to `n` delayed retries (so `n + 1` attempts in total, the first
    /// being immediate).
    Bounded(u32),
    /// Keep retrying until a terminal outcome is reached.
    Unbounded,
}

impl Default for Attempts {
    fn default() -> Self {
        Attempts::Bounded(crate::DEFAULT_MAX_ATTEMPTS)
    }
}

/// Remaining-attempts counter for one logical operation invocation.
#[derive(Debug, Clone)]
pub(crate) struct RetryBudget {
    /// `None` means unbounded.
    remaining: Option<u32>,
}

impl RetryBudget {
    pub(crate) fn new(attempts: Attempts) -> Self {
        let remaining = match attempts {
            Attempts::Bounded(n) => Some(n),
            Attempts::Unbounded => None,
        };
        Self { remaining }
    }

    /// True when no delayed retries remain. The caller must resolve a
    /// terminal outcome instead of sleeping again.
    pub(crate) fn is_last(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Consume one attempt. Returns whether one was available; does nothing
    /// when the budget is already exhausted.
    pub(crate) fn consume(&mut self) -> bool {
        match &mut self.remaining {
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
            None => true,
        }
    }
}
