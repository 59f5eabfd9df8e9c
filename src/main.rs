//! custom-oauth CLI binary entry point.

use std::process::ExitCode;

use clap::Parser;
use custom_oauth::cli::{AuthCommands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Login => custom_oauth::cli::auth::handle_login().await,
            AuthCommands::Status => custom_oauth::cli::auth::handle_status()
                .await
                .map(|()| ExitCode::SUCCESS),
            AuthCommands::Token(args) => custom_oauth::cli::auth::handle_token(args.force_refresh)
                .await
                .map(|()| ExitCode::SUCCESS),
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
