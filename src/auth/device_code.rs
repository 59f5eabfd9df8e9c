use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::token::Credential;

/// Grant type sent when polling the token endpoint.
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Response of the device-code endpoint.
///
/// Kept as the raw JSON object so presentation layers can read whatever
/// the authorization server returns; typed accessors cover the standard
/// RFC 8628 fields.
///
/// # Example
/// ```
/// use custom_oauth::auth::DeviceAuthorization;
///
/// let auth: DeviceAuthorization = serde_json::from_str(
///     r#"{"device_code":"dc","user_code":"ABCD-EFGH","verification_uri":"https://auth.example/device"}"#,
/// ).unwrap();
/// assert_eq!(auth.user_code(), Some("ABCD-EFGH"));
/// assert_eq!(auth.display_uri(), Some("https://auth.example/device"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAuthorization(Map<String, Value>);

impl DeviceAuthorization {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn device_code(&self) -> Option<&str> {
        self.str_field("device_code")
    }

    pub fn user_code(&self) -> Option<&str> {
        self.str_field("user_code")
    }

    pub fn verification_uri(&self) -> Option<&str> {
        self.str_field("verification_uri")
    }

    pub fn verification_uri_complete(&self) -> Option<&str> {
        self.str_field("verification_uri_complete")
    }

    /// The URL to show a human, preferring the one with the code embedded.
    pub fn display_uri(&self) -> Option<&str> {
        self.verification_uri_complete()
            .or_else(|| self.verification_uri())
    }

    pub fn expires_in(&self) -> Option<u64> {
        self.0.get("expires_in").and_then(Value::as_u64)
    }

    pub fn interval(&self) -> Option<u64> {
        self.0.get("interval").and_then(Value::as_u64)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Lifecycle of one device-flow attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceFlowState {
    Unstarted,
    AwaitingAuthorization,
    Authorized,
    Failed,
    Cancelled,
}

/// Terminal result of polling, other than failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFlowOutcome {
    /// The user completed authorization; the credential has been persisted.
    Authorized(Credential),
    /// The caller's cancellation token fired.
    Cancelled,
}

impl DeviceFlowOutcome {
    pub fn state(&self) -> DeviceFlowState {
        match self {
            Self::Authorized(_) => DeviceFlowState::Authorized,
            Self::Cancelled => DeviceFlowState::Cancelled,
        }
    }
}

/// `error` values the token endpoint may return while polling.
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TokenErrorCode {
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
    #[strum(default)]
    Other(String),
}

impl TokenErrorCode {
    /// Whether the human simply has not finished the browser step yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::AuthorizationPending | Self::SlowDown)
    }
}
