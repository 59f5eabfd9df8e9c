//! File-based mutual exclusion that holds across OS processes.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::AuthError;
use super::store::ensure_parent;
use crate::util::BackoffPolicy;

/// Exclusive access to a file path, valid across processes.
///
/// Implementations retry internally and fail with
/// [`AuthError::LockUnavailable`] once their retry budget is spent.
#[async_trait]
pub trait CrossProcessLock: Send + Sync {
    async fn acquire(&self, path: &Path) -> Result<LockGuard, AuthError>;
}

/// Proof of holding a [`CrossProcessLock`].
///
/// The release runs exactly once: on [`LockGuard::release`] or, failing
/// that, when the guard is dropped (early return, `?`, panic unwinding).
pub struct LockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LockGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Release the lock off the async worker threads.
    pub async fn release(mut self) {
        if let Some(release) = self.release.take() {
            if let Err(err) = tokio::task::spawn_blocking(release).await {
                warn!(error = %err, "credential lock release did not complete");
            }
        }
    }
}

impl Drop for LockGuard {
    // Fallback path; a release here is one read and one unlink.
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Lock implemented as a sidecar `<path>.lock` file created with
/// `create_new`, which is atomic on every platform we target.
///
/// A holder keeps the lock file's mtime fresh; a lock file older than
/// `stale_after` belongs to a crashed process and is reclaimed. Reclaiming
/// is serialized through a second `<path>.lock.reclaim` file, and the
/// staleness check is repeated inside it, so a lock that another waiter has
/// already replaced is never removed.
#[derive(Debug, Clone)]
pub struct LockFile {
    policy: BackoffPolicy,
    stale_after: Duration,
    heartbeat: Duration,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::default(),
            stale_after: Duration::from_secs(10),
            heartbeat: Duration::from_secs(5),
        }
    }
}

impl LockFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self.heartbeat = stale_after / 2;
        self
    }

    pub fn lock_path(path: &Path) -> PathBuf {
        with_suffix(path, ".lock")
    }

    async fn is_stale(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path).await else {
            return false;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.stale_after)
    }

    /// Remove `lock_path` if it is still stale once this caller holds the
    /// reclaim file. Returns whether the stale lock is gone.
    async fn reclaim(&self, lock_path: &Path, owner: &str) -> std::io::Result<bool> {
        let reclaim_path = with_suffix(lock_path, ".reclaim");
        match try_create(&reclaim_path, owner).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                // A reclaimer that crashed mid-way leaves this behind.
                if self.is_stale(&reclaim_path).await {
                    remove_ignoring_missing(&reclaim_path).await?;
                }
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        let removed = if self.is_stale(lock_path).await {
            warn!(path = %lock_path.display(), "reclaiming stale credential lock");
            remove_ignoring_missing(lock_path).await.map(|()| true)
        } else {
            Ok(false)
        };

        let reclaim_owner = owner.to_string();
        if let Err(err) =
            tokio::task::spawn_blocking(move || release_if_owned(&reclaim_path, &reclaim_owner))
                .await
        {
            warn!(error = %err, "stale lock reclaim did not clean up");
        }
        removed
    }

    fn guard(&self, lock_path: PathBuf, owner: String) -> LockGuard {
        let heartbeat = spawn_heartbeat(lock_path.clone(), self.heartbeat);
        LockGuard::new(move || {
            heartbeat.abort();
            release_if_owned(&lock_path, &owner);
        })
    }
}

#[async_trait]
impl CrossProcessLock for LockFile {
    async fn acquire(&self, path: &Path) -> Result<LockGuard, AuthError> {
        ensure_parent(path).await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        let lock_path = Self::lock_path(path);
        let owner = format!("{}:{}", std::process::id(), uuid::Uuid::new_v4());
        let mut attempt = 0;
        loop {
            match try_create(&lock_path, &owner).await {
                Ok(()) => {
                    debug!(path = %path.display(), attempt, "credential lock acquired");
                    return Ok(self.guard(lock_path, owner));
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }

            if self.is_stale(&lock_path).await && self.reclaim(&lock_path, &owner).await? {
                continue;
            }

            let Some(delay) = self.policy.delay_after(attempt) else {
                return Err(AuthError::LockUnavailable {
                    path: path.to_path_buf(),
                    attempts: self.policy.max_attempts(),
                });
            };
            debug!(
                path = %path.display(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "credential lock busy, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

async fn try_create(lock_path: &Path, owner: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .await?;
    file.write_all(owner.as_bytes()).await?;
    file.flush().await
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn remove_ignoring_missing(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

async fn touch(path: &Path) -> std::io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path).await?;
    let file = file.into_std().await;
    tokio::task::spawn_blocking(move || file.set_modified(SystemTime::now()))
        .await
        .map_err(std::io::Error::other)?
}

fn spawn_heartbeat(lock_path: PathBuf, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            if let Err(err) = touch(&lock_path).await {
                debug!(path = %lock_path.display(), error = %err, "lock heartbeat failed");
                return;
            }
        }
    })
}

fn release_if_owned(lock_path: &Path, owner: &str) {
    match std::fs::read_to_string(lock_path) {
        Ok(current) if current == owner => {
            if let Err(err) = std::fs::remove_file(lock_path) {
                warn!(path = %lock_path.display(), error = %err, "failed to release credential lock");
            }
        }
        Ok(_) => warn!(path = %lock_path.display(), "credential lock was taken over before release"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(path = %lock_path.display(), error = %err, "failed to inspect credential lock"),
    }
}
