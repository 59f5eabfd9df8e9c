//! Error types for custom-oauth.

use thiserror::Error;

use crate::auth::AuthError;

/// Broad classification used to decide how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Configuration,
    Network,
    Server,
    Api,
    Storage,
    Unknown,
}

/// Primary error type for operations that sit above the auth layer.
#[derive(Error, Debug)]
pub enum CustomOAuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl CustomOAuthError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Network(_) => ErrorCategory::Network,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Auth(err) => match err {
                AuthError::Configuration(_) => ErrorCategory::Configuration,
                AuthError::Network(_) => ErrorCategory::Network,
                AuthError::Http { status, .. } if *status >= 500 => ErrorCategory::Server,
                AuthError::LockUnavailable { .. }
                | AuthError::CorruptStore { .. }
                | AuthError::Io(_) => ErrorCategory::Storage,
                AuthError::NoRefreshToken
                | AuthError::MissingAccessToken
                | AuthError::TokenEndpoint { .. }
                | AuthError::Http { .. } => ErrorCategory::Authentication,
                _ => ErrorCategory::Unknown,
            },
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Server
        ) || matches!(self, Self::Auth(AuthError::LockUnavailable { .. }))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CustomOAuthError>;
