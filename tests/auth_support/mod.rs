#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use custom_oauth::auth::{
    AuthError, Credential, LockFile, ManualClock, PollTimer, SharedTokenManager, TokenClient, Wait,
};
use custom_oauth::util::BackoffPolicy;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const NOW: i64 = 1_750_000_000_000;
pub const HOUR_MS: i64 = 3_600_000;

pub fn credential(access: &str, refresh: Option<&str>, expiry_date: Option<i64>) -> Credential {
    Credential {
        access_token: Some(access.to_string()),
        refresh_token: refresh.map(String::from),
        expiry_date,
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(NOW))
}

pub fn manager(dir: &TempDir) -> SharedTokenManager {
    SharedTokenManager::new(dir.path().join("custom_oauth_credentials.json")).with_clock(clock())
}

/// Manager whose lock gives up quickly, for contention tests.
pub fn impatient_manager(dir: &TempDir) -> SharedTokenManager {
    let lock = LockFile::new().with_policy(BackoffPolicy {
        retries: 1,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
        multiplier: 1.0,
    });
    manager(dir).with_lock(Arc::new(lock))
}

/// Behaviour of [`FakeClient::refresh_access_token`].
pub enum RefreshBehavior {
    /// Issue `refreshed-<n>` valid for an hour, keeping the refresh token.
    Succeed,
    /// Like `Succeed`, after sleeping.
    SucceedAfter(Duration),
    /// Fail with an HTTP 400.
    Fail,
    /// Run a side effect first, then succeed.
    SucceedWith(Box<dyn Fn() + Send + Sync>),
}

pub struct FakeClient {
    current: Mutex<Credential>,
    refreshes: AtomicU32,
    seen_by_refresh: Mutex<Vec<Credential>>,
    behavior: RefreshBehavior,
}

impl FakeClient {
    pub fn new(behavior: RefreshBehavior) -> Self {
        Self {
            current: Mutex::new(Credential::default()),
            refreshes: AtomicU32::new(0),
            seen_by_refresh: Mutex::new(Vec::new()),
            behavior,
        }
    }

    pub fn with_credentials(self, credential: Credential) -> Self {
        *self.current.lock().expect("client lock poisoned") = credential;
        self
    }

    pub fn refresh_count(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Credentials the client held each time refresh was invoked.
    pub fn seen_by_refresh(&self) -> Vec<Credential> {
        self.seen_by_refresh
            .lock()
            .expect("client lock poisoned")
            .clone()
    }
}

#[async_trait]
impl TokenClient for FakeClient {
    fn credentials(&self) -> Credential {
        self.current.lock().expect("client lock poisoned").clone()
    }

    fn set_credentials(&self, credential: Credential) {
        *self.current.lock().expect("client lock poisoned") = credential;
    }

    async fn refresh_access_token(&self) -> Result<Credential, AuthError> {
        let current = self.credentials();
        self.seen_by_refresh
            .lock()
            .expect("client lock poisoned")
            .push(current.clone());
        match &self.behavior {
            RefreshBehavior::Succeed => {}
            RefreshBehavior::SucceedAfter(delay) => tokio::time::sleep(*delay).await,
            RefreshBehavior::Fail => {
                return Err(AuthError::Http {
                    context: "Token refresh",
                    status: 400,
                })
            }
            RefreshBehavior::SucceedWith(effect) => effect(),
        }
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::from_grant(
            format!("refreshed-{n}"),
            current.refresh_token,
            3600,
            NOW,
        ))
    }
}

/// Poll timer that never sleeps but still honours cancellation.
#[derive(Debug, Default)]
pub struct InstantTimer {
    waits: AtomicU32,
}

impl InstantTimer {
    pub fn waits(&self) -> u32 {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollTimer for InstantTimer {
    async fn wait(&self, _period: Duration, cancel: &CancellationToken) -> Wait {
        self.waits.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            Wait::Cancelled
        } else {
            Wait::Elapsed
        }
    }
}
