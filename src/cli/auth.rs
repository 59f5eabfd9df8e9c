//! CLI auth command handlers for login, status, and token.

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use crate::auth::{credential_source, CredentialStore, DeviceFlowClient, DeviceFlowOutcome};
use crate::config::CustomOAuthSettings;

fn load_settings() -> Result<CustomOAuthSettings, Box<dyn std::error::Error>> {
    let settings = CustomOAuthSettings::load()?;
    settings.validate()?;
    Ok(settings)
}

/// Exit status for a login the user aborted with Ctrl+C.
pub const CANCELLED_EXIT_CODE: u8 = 130;

/// Handle `custom-oauth auth login`.
///
/// Returns [`CANCELLED_EXIT_CODE`] when the user cancels the device flow.
pub async fn handle_login() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let settings = load_settings()?;
    if settings.static_api_key.is_some() {
        println!("✅ Static API key configured; no login needed.");
        return Ok(ExitCode::SUCCESS);
    }

    let client = DeviceFlowClient::from_settings(&settings)?;
    let authorization = client.request_device_authorization().await?;
    let device_code = authorization
        .device_code()
        .ok_or("device authorization response has no device_code")?
        .to_string();

    if let Some(uri) = authorization.display_uri() {
        println!("🔗 Visit: {uri}");
    }
    if let Some(code) = authorization.user_code() {
        println!("📋 Enter code: {code}");
    }
    println!("⏳ Waiting for authorization... (Ctrl+C to cancel)");

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let outcome = client.poll_device_token(&device_code, &cancel).await;
    ctrl_c.abort();
    let outcome = outcome?;
    match &outcome {
        DeviceFlowOutcome::Authorized(_) => println!("✅ Login successful!"),
        DeviceFlowOutcome::Cancelled => eprintln!("❌ Device authorization cancelled."),
    }
    Ok(ExitCode::from(login_exit_status(&outcome)))
}

fn login_exit_status(outcome: &DeviceFlowOutcome) -> u8 {
    match outcome {
        DeviceFlowOutcome::Authorized(_) => 0,
        DeviceFlowOutcome::Cancelled => CANCELLED_EXIT_CODE,
    }
}

/// Handle `custom-oauth auth status`.
pub async fn handle_status() -> Result<(), Box<dyn std::error::Error>> {
    let settings = CustomOAuthSettings::load()?;
    println!("🔐 Authentication Status\n");

    if settings.static_api_key.is_some() {
        println!("  Mode: static API key");
        return Ok(());
    }

    let store = CredentialStore::new(settings.credential_path());
    println!("  Credential file: {}", store.path().display());
    match store.read().await {
        Ok(Some(credential)) => {
            let now = chrono::Utc::now().timestamp_millis();
            let status = match credential.expires_at() {
                Some(expires) if credential.is_usable_at(now) => {
                    format!("✅ Logged in (expires {})", expires.format("%Y-%m-%d %H:%M"))
                }
                _ if credential.refresh_token().is_some() => {
                    "⚠️  Token expired (will auto-refresh)".to_string()
                }
                _ => "❌ Token expired, login required".to_string(),
            };
            println!("  Status: {status}");
        }
        Ok(None) => println!("  Status: ❌ Not logged in"),
        Err(e) => println!("  Status: ⚠️  Error: {e}"),
    }
    Ok(())
}

/// Handle `custom-oauth auth token`.
pub async fn handle_token(force_refresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings()?;
    let source = credential_source(&settings)?;
    let token = source.access_token(force_refresh).await?;
    println!("{token}");
    Ok(())
}
