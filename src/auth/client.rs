//! OAuth2 device-authorization and refresh-token grants against a custom
//! authorization server.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::device_code::{
    DeviceAuthorization, DeviceFlowOutcome, TokenErrorCode, DEVICE_CODE_GRANT_TYPE,
};
use super::error::AuthError;
use super::manager::{SharedTokenManager, TokenClient};
use super::timer::{Clock, PollTimer, SystemClock, TokioTimer, Wait};
use super::token::Credential;
use crate::config::CustomOAuthSettings;

/// Fixed wait between token-endpoint polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Device-flow OAuth client.
///
/// Holds the in-memory credential and renews it through the shared
/// credential file, so concurrent invocations of the tool agree on one
/// token set.
///
/// # Example
/// ```no_run
/// use custom_oauth::auth::{DeviceFlowClient, SharedTokenManager};
///
/// # async fn example() -> Result<(), custom_oauth::auth::AuthError> {
/// let manager = SharedTokenManager::new("/tmp/custom_oauth_credentials.json");
/// let client = DeviceFlowClient::new("https://auth.example.com", "my-cli", manager)?;
/// let token = client.access_token(false).await?;
/// # Ok(())
/// # }
/// ```
pub struct DeviceFlowClient {
    http: reqwest::Client,
    auth_server_url: String,
    client_id: String,
    scope: Option<String>,
    credentials: Mutex<Credential>,
    manager: SharedTokenManager,
    timer: Arc<dyn PollTimer>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl fmt::Debug for DeviceFlowClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceFlowClient")
            .field("auth_server_url", &self.auth_server_url)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("manager", &self.manager)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl DeviceFlowClient {
    /// Fails with [`AuthError::Configuration`] when either the server URL or
    /// the client id is blank.
    pub fn new(
        auth_server_url: impl Into<String>,
        client_id: impl Into<String>,
        manager: SharedTokenManager,
    ) -> Result<Self, AuthError> {
        let auth_server_url = auth_server_url.into().trim().trim_end_matches('/').to_string();
        let client_id = client_id.into().trim().to_string();
        if auth_server_url.is_empty() {
            return Err(AuthError::Configuration(
                "Custom OAuth configuration is missing authServerUrl.".to_string(),
            ));
        }
        if client_id.is_empty() {
            return Err(AuthError::Configuration(
                "Custom OAuth configuration is missing clientId.".to_string(),
            ));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            auth_server_url,
            client_id,
            scope: None,
            credentials: Mutex::new(Credential::default()),
            manager,
            timer: Arc::new(TokioTimer),
            clock: Arc::new(SystemClock),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Build a client from resolved settings, sharing the credential file
    /// named there.
    pub fn from_settings(settings: &CustomOAuthSettings) -> Result<Self, AuthError> {
        let manager = SharedTokenManager::new(settings.credential_path());
        let client = Self::new(
            settings.auth_server_url.clone().unwrap_or_default(),
            settings.client_id.clone().unwrap_or_default(),
            manager,
        )?;
        Ok(client.with_scope(settings.scope.clone()))
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_timer(mut self, timer: Arc<dyn PollTimer>) -> Self {
        self.timer = timer;
        self
    }

    /// Use `clock` for expiry arithmetic here and in the shared manager.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.manager = self.manager.with_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn manager(&self) -> &SharedTokenManager {
        &self.manager
    }

    fn device_code_url(&self) -> String {
        format!("{}/oauth/device/code", self.auth_server_url)
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.auth_server_url)
    }

    /// Current access token, renewed through the shared credential file when
    /// needed. Pass `force_refresh` after the API rejected the token.
    pub async fn access_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        let credential = self
            .manager
            .get_valid_credentials(self, force_refresh)
            .await?;
        credential
            .access_token()
            .map(str::to_string)
            .ok_or(AuthError::MissingAccessToken)
    }

    /// Start a device-authorization attempt.
    pub async fn request_device_authorization(&self) -> Result<DeviceAuthorization, AuthError> {
        let mut form = vec![("client_id", self.client_id.as_str())];
        if let Some(scope) = self.scope.as_deref() {
            form.push(("scope", scope));
        }
        let resp = self
            .http
            .post(self.device_code_url())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Http {
                context: "Device authorization request",
                status: resp.status().as_u16(),
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|err| {
            AuthError::InvalidResponse(format!("device authorization response: {err}"))
        })
    }

    /// Poll the token endpoint until the user authorizes, the server reports
    /// a terminal error, or `cancel` fires.
    ///
    /// `authorization_pending` and `slow_down` keep the loop going; there is
    /// no local attempt limit, the device code's own expiry ends the flow.
    pub async fn poll_device_token(
        &self,
        device_code: &str,
        cancel: &CancellationToken,
    ) -> Result<DeviceFlowOutcome, AuthError> {
        let form = [
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("device_code", device_code),
            ("client_id", self.client_id.as_str()),
        ];

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(DeviceFlowOutcome::Cancelled);
            }
            if self.timer.wait(self.poll_interval, cancel).await == Wait::Cancelled {
                return Ok(DeviceFlowOutcome::Cancelled);
            }
            attempt += 1;

            let resp = self
                .http
                .post(self.token_url())
                .header("Accept", "application/json")
                .form(&form)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;

            if status.is_success() {
                let grant = parse_grant(&body)?;
                let credential = Credential::from_grant(
                    grant.access_token,
                    grant.refresh_token,
                    grant.expires_in,
                    self.clock.now_ms(),
                );
                self.manager.save_credentials(&credential).await?;
                self.set_credentials(credential.clone());
                info!(attempt, "device authorization completed");
                return Ok(DeviceFlowOutcome::Authorized(credential));
            }

            let error: TokenErrorResponse = serde_json::from_str(&body).map_err(|_| {
                AuthError::Http {
                    context: "Token polling",
                    status: status.as_u16(),
                }
            })?;
            let code: TokenErrorCode = error
                .error
                .parse()
                .unwrap_or_else(|_| TokenErrorCode::Other(error.error.clone()));
            if !code.is_pending() {
                return Err(AuthError::TokenEndpoint {
                    error: error.error,
                    description: error.error_description.filter(|d| !d.is_empty()),
                });
            }
            if cancel.is_cancelled() {
                return Ok(DeviceFlowOutcome::Cancelled);
            }
            debug!(attempt, code = %error.error, "device authorization pending");
        }
    }
}

#[async_trait]
impl TokenClient for DeviceFlowClient {
    fn credentials(&self) -> Credential {
        self.credentials
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_credentials(&self, credential: Credential) {
        match self.credentials.lock() {
            Ok(mut guard) => *guard = credential,
            Err(poisoned) => *poisoned.into_inner() = credential,
        }
    }

    async fn refresh_access_token(&self) -> Result<Credential, AuthError> {
        let current = self.credentials();
        let refresh_token = current
            .refresh_token()
            .ok_or(AuthError::NoRefreshToken)?
            .to_string();

        let resp = self
            .http
            .post(self.token_url())
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::Http {
                context: "Token refresh",
                status: resp.status().as_u16(),
            });
        }
        let grant = parse_grant(&resp.text().await?)?;
        Ok(Credential::from_grant(
            grant.access_token,
            grant.refresh_token.or(Some(refresh_token)),
            grant.expires_in,
            self.clock.now_ms(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrantResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn parse_grant(body: &str) -> Result<TokenGrantResponse, AuthError> {
    let mut grant: TokenGrantResponse = serde_json::from_str(body)
        .map_err(|err| AuthError::InvalidResponse(format!("token response: {err}")))?;
    if grant.expires_in < 0 {
        return Err(AuthError::InvalidResponse(format!(
            "token response: negative expires_in {}",
            grant.expires_in
        )));
    }
    grant.refresh_token = grant.refresh_token.filter(|t| !t.is_empty());
    Ok(grant)
}
