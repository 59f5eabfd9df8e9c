use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are renewed this long before their literal expiry.
pub const EXPIRY_SKEW_MS: i64 = 60_000;

/// OAuth credential set shared between processes through the credential file.
///
/// All fields are optional on disk; an empty object is a valid (unusable)
/// credential.
///
/// # Example
/// ```
/// use custom_oauth::auth::Credential;
///
/// let credential = Credential {
///     access_token: Some("access".to_string()),
///     refresh_token: Some("refresh".to_string()),
///     expiry_date: Some(1_700_000_000_000),
/// };
/// assert!(credential.is_expired_at(1_700_000_000_000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl Credential {
    /// Build a credential from a token-endpoint response received at `now_ms`.
    ///
    /// The expiry saturates instead of overflowing on absurd lifetimes.
    pub fn from_grant(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: i64,
        now_ms: i64,
    ) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token,
            expiry_date: Some(now_ms.saturating_add(expires_in_secs.saturating_mul(1000))),
        }
    }

    /// Access token, if present and non-empty.
    pub fn access_token(&self) -> Option<&str> {
        non_empty(self.access_token.as_deref())
    }

    /// Refresh token, if present and non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(self.refresh_token.as_deref())
    }

    /// Whether the token must be treated as expired at `now_ms`.
    ///
    /// A missing expiry counts as expired, and the [`EXPIRY_SKEW_MS`] margin
    /// is applied so that the boundary itself is expired.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expiry_date {
            Some(expiry) => now_ms >= expiry.saturating_sub(EXPIRY_SKEW_MS),
            None => true,
        }
    }

    /// Whether this credential can be used as-is at `now_ms`.
    pub fn is_usable_at(&self, now_ms: i64) -> bool {
        self.access_token().is_some() && !self.is_expired_at(now_ms)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry_date.and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
