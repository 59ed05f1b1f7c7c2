//! Filesystem capability trait with blocking and non-blocking bindings.
//!
//! The state machines in `engine` are written once against [`LockFs`] and
//! never touch the platform directly. [`StdFs`] backs the `*_sync` entry
//! points: every method completes synchronously when polled, so the engine
//! can be driven by `futures::executor::block_on` without any runtime.
//! [`TokioFs`] backs the async entry points.
//!
//! Error classification rides on `std::io::ErrorKind`: `AlreadyExists` is
//! the contention signal from `create_dir`, `NotFound` is the conclusive
//! absence signal from `remove_dir` and `modified`.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// The filesystem and timing capabilities the lock state machines need.
#[async_trait]
pub(crate) trait LockFs: Send + Sync {
    /// Symlink-resolved absolute form of a path. Fails if it doesn't exist.
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Create the sentinel directory. Fails with `AlreadyExists` when held.
    async fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Remove the sentinel directory. Fails with `NotFound` when absent.
    async fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// The sentinel's last-modified time.
    async fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Refresh the sentinel's last-modified time to now.
    async fn touch(&self, path: &Path) -> io::Result<()>;

    /// Delay between retry attempts.
    async fn sleep(&self, duration: Duration);
}

/// Blocking binding: `std::fs` I/O, `std::thread::sleep` delays.
pub(crate) struct StdFs;

#[async_trait]
impl LockFs for StdFs {
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    async fn touch(&self, path: &Path) -> io::Result<()> {
        touch_now(path)
    }

    async fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Non-blocking binding: `tokio::fs` I/O, `tokio::time::sleep` delays.
pub(crate) struct TokioFs;

#[async_trait]
impl LockFs for TokioFs {
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(path).await
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir(path).await
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_dir(path).await
    }

    async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        tokio::fs::metadata(path).await?.modified()
    }

    async fn touch(&self, path: &Path) -> io::Result<()> {
        // No async utimes exists; hop to the blocking pool.
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || touch_now(&path))
            .await
            .map_err(io::Error::other)?
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Set a path's modification time to now. Works on directories, which is
/// what the sentinel is.
#[cfg(unix)]
pub(crate) fn touch_now(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
    let now = libc::timespec {
        tv_sec: 0,
        tv_nsec: libc::UTIME_NOW,
    };
    let times = [now, now];
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, cpath.as_ptr(), times.as_ptr(), 0) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Best-effort fallback for non-Unix platforms. Opening a directory handle
/// is not universally supported there, in which case the touch fails and the
/// caller's staleness window shrinks to the sentinel's creation time.
#[cfg(not(unix))]
pub(crate) fn touch_now(path: &Path) -> io::Result<()> {
    std::fs::File::open(path)?.set_modified(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_create_dir_signals_contention_as_already_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentinel.lock");

        futures::executor::block_on(StdFs.create_dir(&path)).unwrap();
        let err = futures::executor::block_on(StdFs.create_dir(&path)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_remove_dir_signals_absence_as_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentinel.lock");

        let err = futures::executor::block_on(StdFs.remove_dir(&path)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        futures::executor::block_on(StdFs.create_dir(&path)).unwrap();
        futures::executor::block_on(StdFs.remove_dir(&path)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_touch_advances_directory_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentinel.lock");
        std::fs::create_dir(&path).unwrap();

        let before = std::fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        touch_now(&path).unwrap();
        let after = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_tokio_binding_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentinel.lock");

        TokioFs.create_dir(&path).await.unwrap();
        let err = TokioFs.create_dir(&path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        TokioFs.touch(&path).await.unwrap();
        TokioFs.modified(&path).await.unwrap();

        TokioFs.remove_dir(&path).await.unwrap();
        let err = TokioFs.modified(&path).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
