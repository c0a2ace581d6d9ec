//! Case Nexus server binary.
//!
//! Starts the caseload intelligence server: HTTP read API plus the WebSocket
//! control channel that drives the analysis workflows.

use case_nexus::cli::{Cli, Command};
use case_nexus::config::Config;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load local .env for developer workflows. Existing process environment
    // still takes precedence over .env values.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = Config::from_env()?;
            case_nexus::server::serve(args, config).await
        }
    }
}
