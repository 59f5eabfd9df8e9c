//! Authorized access to the API that consumes custom OAuth tokens.

pub mod http;

use std::fmt;
use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

use crate::auth::{credential_source, CredentialSource};
use crate::config::CustomOAuthSettings;
use crate::error::Result;

/// HTTP client that attaches a bearer token from a [`CredentialSource`] and
/// recovers once from a rejected token.
///
/// # Example
/// ```no_run
/// use custom_oauth::config::CustomOAuthSettings;
/// use custom_oauth::provider::AuthorizedClient;
///
/// # async fn example() -> custom_oauth::error::Result<()> {
/// let client = AuthorizedClient::from_settings(&CustomOAuthSettings::load()?)?;
/// let url = client.url("/models");
/// let resp = client.send(|http| http.get(&url)).await?;
/// println!("{}", resp.text().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    api_url: String,
    source: Arc<dyn CredentialSource>,
}

impl fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("api_url", &self.api_url)
            .field("source", &self.source)
            .finish()
    }
}

impl AuthorizedClient {
    pub fn new(api_url: impl Into<String>, source: Arc<dyn CredentialSource>) -> Self {
        Self {
            http: http::shared_client().clone(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            source,
        }
    }

    /// Validate `settings` and wire up the credential source they select.
    pub fn from_settings(settings: &CustomOAuthSettings) -> Result<Self> {
        settings.validate()?;
        let source = credential_source(settings)?;
        let api_url = settings.api_url.clone().unwrap_or_default();
        Ok(Self::new(api_url, source))
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn source(&self) -> &Arc<dyn CredentialSource> {
        &self.source
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    /// Attach the current access token to `request`.
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.source.access_token(false).await?;
        Ok(request.bearer_auth(token))
    }

    /// React to an API error status. Returns `true` when the token was
    /// renewed and the request is worth retrying.
    pub async fn handle_auth_error(&self, status: StatusCode) -> bool {
        if status != StatusCode::UNAUTHORIZED {
            return false;
        }
        match self.source.access_token(true).await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "forced token refresh after 401 failed");
                false
            }
        }
    }

    /// Send the request produced by `build`, retrying once with a renewed
    /// token if the API answers 401.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut resp = self.authorize(build(&self.http)).await?.send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED && self.handle_auth_error(resp.status()).await
        {
            resp = self.authorize(build(&self.http)).await?.send().await?;
        }
        if !resp.status().is_success() {
            return Err(http::error_from_response(resp).await);
        }
        Ok(resp)
    }
}

