//! Error types for lock operations.
//!
//! Ordinary contention and transient I/O failures are never errors here —
//! those exhaust the retry budget and resolve to an absent outcome instead.
//! Only precondition violations escalate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that escalate past the retry machinery.
#[derive(Error, Debug)]
pub enum LockError {
    /// The target path could not be canonicalized and no explicit lock path
    /// was supplied. Locking a path that does not exist requires an explicit
    /// `lock_path` override.
    #[error("cannot resolve target path '{}': {source}", path.display())]
    TargetUnresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sentinel directory could not be created for a structural reason
    /// (its parent directory does not exist). Retrying cannot help.
    #[error("cannot create lock sentinel at '{}': {source}", path.display())]
    SentinelUnusable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_messages_name_the_path() {
        let err = LockError::TargetUnresolvable {
            path: PathBuf::from("/no/such/target"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/no/such/target"));

        let err = LockError::SentinelUnusable {
            path: PathBuf::from("/no/such/parent/x.lock"),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("x.lock"));
    }
}
