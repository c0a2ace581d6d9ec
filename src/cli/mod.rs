//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Case Nexus — AI-powered legal caseload intelligence
#[derive(Parser, Debug)]
#[command(name = "case-nexus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the caseload intelligence server
    Serve(ServeArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5001")]
    pub port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub hostname: String,

    /// Path to the SQLite database (":memory:" for ephemeral)
    #[arg(long, env = "CASE_NEXUS_DB")]
    pub db: Option<PathBuf>,
}
