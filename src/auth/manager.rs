use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::error::AuthError;
use super::lock::{CrossProcessLock, LockFile};
use super::store::CredentialStore;
use super::timer::{Clock, SystemClock};
use super::token::Credential;

/// The side of an OAuth client that the [`SharedTokenManager`] drives.
///
/// The client owns the in-memory view of the credential and knows how to
/// renew it; the manager owns the persisted view and decides when to renew.
#[async_trait]
pub trait TokenClient: Send + Sync {
    fn credentials(&self) -> Credential;
    fn set_credentials(&self, credential: Credential);
    /// Renew the credential last passed to [`TokenClient::set_credentials`].
    async fn refresh_access_token(&self) -> Result<Credential, AuthError>;
}

/// Serializes the read-decide-refresh-write cycle on one credential file.
///
/// Every operation runs under a single [`CrossProcessLock`] acquisition on
/// the credential path, so two processes started at the same moment cannot
/// both refresh and overwrite each other's tokens.
///
/// # Example
/// ```no_run
/// use custom_oauth::auth::{Credential, SharedTokenManager};
///
/// # async fn example() -> Result<(), custom_oauth::auth::AuthError> {
/// let manager = SharedTokenManager::new("/tmp/custom_oauth_credentials.json");
/// manager.save_credentials(&Credential::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SharedTokenManager {
    store: CredentialStore,
    lock: Arc<dyn CrossProcessLock>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SharedTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTokenManager")
            .field("store", &self.store)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl SharedTokenManager {
    pub fn new(credential_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: CredentialStore::new(credential_path),
            lock: Arc::new(LockFile::default()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_lock(mut self, lock: Arc<dyn CrossProcessLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn credential_path(&self) -> &Path {
        self.store.path()
    }

    /// Return a credential that is usable now, refreshing it through
    /// `client` when it is missing, expired, or `force_refresh` is set.
    ///
    /// The client's in-memory credential always matches the returned value.
    pub async fn get_valid_credentials(
        &self,
        client: &dyn TokenClient,
        force_refresh: bool,
    ) -> Result<Credential, AuthError> {
        let guard = self.lock.acquire(self.store.path()).await?;
        let result = self.read_decide_refresh(client, force_refresh).await;
        guard.release().await;
        result
    }

    /// Persist `credential` under the lock without any refresh decision.
    pub async fn save_credentials(&self, credential: &Credential) -> Result<(), AuthError> {
        let guard = self.lock.acquire(self.store.path()).await?;
        let result = self.store.write(credential).await;
        guard.release().await;
        result
    }

    async fn read_decide_refresh(
        &self,
        client: &dyn TokenClient,
        force_refresh: bool,
    ) -> Result<Credential, AuthError> {
        let mut credential = match self.store.read().await? {
            Some(stored) => stored,
            None => client.credentials(),
        };

        let now = self.clock.now_ms();
        if force_refresh || credential.access_token().is_none() || credential.is_expired_at(now) {
            if credential.refresh_token().is_none() {
                return Err(AuthError::NoRefreshToken);
            }
            debug!(
                path = %self.store.path().display(),
                force_refresh,
                "refreshing shared credential"
            );
            client.set_credentials(credential);
            let refreshed = client.refresh_access_token().await?;
            if let Err(err) = self.store.write(&refreshed).await {
                warn!(
                    path = %self.store.path().display(),
                    error = %err,
                    "refreshed credential could not be persisted"
                );
                client.set_credentials(refreshed);
                return Err(err);
            }
            credential = refreshed;
        }

        client.set_credentials(credential.clone());
        Ok(credential)
    }
}
