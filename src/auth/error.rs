use std::path::PathBuf;

use thiserror::Error;

/// Failures of the credential coordination layer.
///
/// Device-flow cancellation is not an error; it is reported as
/// [`DeviceFlowOutcome::Cancelled`](super::DeviceFlowOutcome::Cancelled).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Could not lock {} after {attempts} attempts", .path.display())]
    LockUnavailable { path: PathBuf, attempts: u32 },
    #[error("Credential store {} is corrupt: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },
    #[error("Authentication expired, no refresh token available")]
    NoRefreshToken,
    #[error("Failed to obtain access token")]
    MissingAccessToken,
    #[error("{context} failed with status {status}")]
    Http { context: &'static str, status: u16 },
    #[error("Token polling failed: {}", .description.as_deref().unwrap_or(.error))]
    TokenEndpoint {
        error: String,
        description: Option<String>,
    },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for AuthError {
    fn from(error: toml::de::Error) -> Self {
        Self::Configuration(error.to_string())
    }
}
