//! Configuration for the custom OAuth scheme (layered: code > env > settings file).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bon::Builder;
use serde::Deserialize;

use crate::auth::store::CREDENTIAL_FILE_NAME;
use crate::error::CustomOAuthError;

/// Per-user directory shared by every invocation of the tool.
pub const TOOL_DIR_NAME: &str = ".qwen";
/// Settings file inside [`TOOL_DIR_NAME`].
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

const ENV_MAPPINGS: &[(&str, Field)] = &[
    ("CUSTOM_OAUTH_API_URL", Field::ApiUrl),
    ("CUSTOM_OAUTH_AUTH_SERVER_URL", Field::AuthServerUrl),
    ("CUSTOM_OAUTH_CLIENT_ID", Field::ClientId),
    ("CUSTOM_OAUTH_SCOPE", Field::Scope),
    ("CUSTOM_OAUTH_STATIC_API_KEY", Field::StaticApiKey),
    ("CUSTOM_OAUTH_CREDENTIAL_PATH", Field::CredentialPath),
];

#[derive(Debug, Clone, Copy)]
enum Field {
    ApiUrl,
    AuthServerUrl,
    ClientId,
    Scope,
    StaticApiKey,
    CredentialPath,
}

/// Settings for the custom OAuth authorization scheme.
///
/// # Example
/// ```
/// use custom_oauth::config::CustomOAuthSettings;
///
/// let settings = CustomOAuthSettings::builder()
///     .api_url("https://llm.example.com/v1".to_string())
///     .auth_server_url("https://auth.example.com".to_string())
///     .client_id("my-cli".to_string())
///     .build();
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Deserialize)]
#[serde(default)]
pub struct CustomOAuthSettings {
    /// Base URL of the API that consumes the access token.
    #[serde(alias = "apiUrl")]
    pub api_url: Option<String>,
    #[serde(alias = "authServerUrl")]
    pub auth_server_url: Option<String>,
    #[serde(alias = "clientId")]
    pub client_id: Option<String>,
    pub scope: Option<String>,
    /// Pre-shared key; when set, OAuth is bypassed.
    #[serde(alias = "staticApiKey")]
    pub static_api_key: Option<String>,
    #[serde(alias = "credentialPath")]
    pub credential_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    security: SecuritySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecuritySection {
    custom: CustomOAuthSettings,
}

impl CustomOAuthSettings {
    /// Load the settings file and overlay environment variables on top.
    pub fn load() -> Result<Self, CustomOAuthError> {
        let file = Self::from_settings_file(default_tool_dir().join(SETTINGS_FILE_NAME))?;
        Ok(file.merged_with(Self::from_env()))
    }

    /// Read `[security.custom]` from a TOML settings file.
    ///
    /// A missing file yields empty settings.
    pub fn from_settings_file(path: impl AsRef<Path>) -> Result<Self, CustomOAuthError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(CustomOAuthError::Configuration(format!(
                    "Cannot read settings file {}: {err}",
                    path.display()
                )))
            }
        };
        let file: SettingsFile = toml::from_str(&raw).map_err(|err| {
            CustomOAuthError::Configuration(format!(
                "Invalid settings file {}: {err}",
                path.display()
            ))
        })?;
        Ok(file.security.custom.normalized())
    }

    /// Read `CUSTOM_OAUTH_*` variables, loading `.env` first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        for (name, field) in ENV_MAPPINGS {
            let Some(value) = lookup(name) else {
                continue;
            };
            match field {
                Field::ApiUrl => settings.api_url = Some(value),
                Field::AuthServerUrl => settings.auth_server_url = Some(value),
                Field::ClientId => settings.client_id = Some(value),
                Field::Scope => settings.scope = Some(value),
                Field::StaticApiKey => settings.static_api_key = Some(value),
                Field::CredentialPath => settings.credential_path = Some(PathBuf::from(value)),
            }
        }
        settings.normalized()
    }

    /// Values present in `overrides` replace the ones in `self`.
    pub fn merged_with(self, overrides: Self) -> Self {
        let overrides = overrides.normalized();
        let base = self.normalized();
        Self {
            api_url: overrides.api_url.or(base.api_url),
            auth_server_url: overrides.auth_server_url.or(base.auth_server_url),
            client_id: overrides.client_id.or(base.client_id),
            scope: overrides.scope.or(base.scope),
            static_api_key: overrides.static_api_key.or(base.static_api_key),
            credential_path: overrides.credential_path.or(base.credential_path),
        }
    }

    /// Trim every value and treat blanks as unset.
    pub fn normalized(self) -> Self {
        Self {
            api_url: clean(self.api_url).map(|url| url.trim_end_matches('/').to_string()),
            auth_server_url: clean(self.auth_server_url)
                .map(|url| url.trim_end_matches('/').to_string()),
            client_id: clean(self.client_id),
            scope: clean(self.scope),
            static_api_key: clean(self.static_api_key),
            credential_path: self
                .credential_path
                .filter(|path| !path.as_os_str().is_empty()),
        }
    }

    /// Check that the settings are complete enough to authenticate.
    pub fn validate(&self) -> Result<(), CustomOAuthError> {
        let settings = self.clone().normalized();
        if settings.api_url.is_none() {
            return Err(CustomOAuthError::Configuration(
                "Custom OAuth requires apiUrl to be configured in settings.".to_string(),
            ));
        }
        if settings.static_api_key.is_some() {
            return Ok(());
        }
        if settings.auth_server_url.is_none() || settings.client_id.is_none() {
            return Err(CustomOAuthError::Configuration(
                "Custom OAuth requires authServerUrl and clientId to be configured in settings unless a staticApiKey is provided.".to_string(),
            ));
        }
        Ok(())
    }

    /// Credential file location: the configured path, or the default one in
    /// the user's tool directory.
    pub fn credential_path(&self) -> PathBuf {
        self.credential_path
            .clone()
            .unwrap_or_else(default_credential_path)
    }
}

/// `~/.qwen`, falling back to a relative directory without a home.
pub fn default_tool_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(TOOL_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(TOOL_DIR_NAME))
}

/// `~/.qwen/custom_oauth_credentials.json`.
pub fn default_credential_path() -> PathBuf {
    default_tool_dir().join(CREDENTIAL_FILE_NAME)
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
