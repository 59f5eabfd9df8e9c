//! Where bearer tokens come from: a pre-shared key or the device flow.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::client::DeviceFlowClient;
use super::error::AuthError;
use crate::config::CustomOAuthSettings;

/// Capability to produce an access token for outgoing API requests.
#[async_trait]
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Return a usable access token. `force_refresh` asks the source to
    /// renew even a token it still believes valid (e.g. after a 401).
    async fn access_token(&self, force_refresh: bool) -> Result<String, AuthError>;
}

/// Pre-shared key that bypasses OAuth entirely.
///
/// Never touches the network or the credential file. The first use per
/// instance emits a notice.
pub struct StaticKeySource {
    key: String,
    announced: AtomicBool,
}

impl StaticKeySource {
    /// Returns `None` for a blank key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self {
            key,
            announced: AtomicBool::new(false),
        })
    }

    fn announce_once(&self) {
        if !self.announced.swap(true, Ordering::SeqCst) {
            info!("Using static API key, bypassing OAuth.");
        }
    }
}

impl fmt::Debug for StaticKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeySource")
            .field("key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl CredentialSource for StaticKeySource {
    async fn access_token(&self, _force_refresh: bool) -> Result<String, AuthError> {
        self.announce_once();
        Ok(self.key.clone())
    }
}

#[async_trait]
impl CredentialSource for DeviceFlowClient {
    async fn access_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        DeviceFlowClient::access_token(self, force_refresh).await
    }
}

/// Pick the credential source the settings call for: the static key when
/// one is configured, otherwise the device flow.
pub fn credential_source(
    settings: &CustomOAuthSettings,
) -> Result<Arc<dyn CredentialSource>, AuthError> {
    if let Some(source) = settings.static_api_key.as_deref().and_then(StaticKeySource::new) {
        return Ok(Arc::new(source));
    }
    Ok(Arc::new(DeviceFlowClient::from_settings(settings)?))
}
