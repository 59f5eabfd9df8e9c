//! CLI entry point for custom-oauth.

pub mod auth;

use clap::{Parser, Subcommand};

/// custom-oauth CLI
#[derive(Parser, Debug)]
#[command(name = "custom-oauth", version, about = "Manage shared custom OAuth credentials")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authentication management
    Auth(AuthArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Run the device authorization flow
    Login,
    /// Show the stored credential's status
    Status,
    /// Print a valid access token, refreshing it if needed
    Token(TokenArgs),
}

/// Arguments for `custom-oauth auth token`.
#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Renew the token even if it has not expired
    #[arg(long)]
    pub force_refresh: bool,
}
