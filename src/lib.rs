//! custom-oauth: shared OAuth2 credentials for command-line tools.
//!
//! Obtains tokens with the OAuth2 device-authorization grant, renews them
//! with the refresh-token grant, and shares them between concurrently
//! running processes through one lock-protected credential file.
//!
//! # Quick Start
//!
//! ```no_run
//! use custom_oauth::config::CustomOAuthSettings;
//! use custom_oauth::auth::credential_source;
//!
//! # async fn example() -> custom_oauth::error::Result<()> {
//! let settings = CustomOAuthSettings::load()?;
//! settings.validate()?;
//! let source = credential_source(&settings)?;
//! let token = source.access_token(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod provider;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
