//! # Keywatch
//!
//! Service binary for the key monitoring pipeline. Subcommands mirror the
//! pipeline's sweeps so each can run under cron, plus `serve` for the
//! standalone unsubscribe service and `run` for the all-in-one daemon.
//!
//! Configuration is environment-sourced (`KEYWATCH_*`, see `config.rs`),
//! loaded once, validated, and passed into every component explicitly.

mod adapters;
mod commands;
mod config;
mod snapshot;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::WatchConfig;

/// Watches identity keys and emails subscribers when they change.
#[derive(Parser, Debug)]
#[command(name = "keywatch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty snapshot store file
    Init,
    /// Poll the registration source once and process all messages
    Signup,
    /// Create one jittered lookup task per active user
    Schedule,
    /// Expire overdue tasks and execute the due ones
    Lookup,
    /// Compare unchecked keys against their baselines
    Check,
    /// Email subscribers about new key changes
    Notify,
    /// Run the unsubscribe web service
    Serve,
    /// Run the long-lived daemon: periodic sweeps plus the web service
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = WatchConfig::load()?;

    match cli.command {
        Command::Init => commands::init(&config),
        Command::Signup => commands::signup(&config),
        Command::Schedule => commands::schedule(&config),
        Command::Lookup => commands::lookup(&config),
        Command::Check => commands::check(&config),
        Command::Notify => commands::notify(&config),
        Command::Serve => commands::serve(&config).await,
        Command::Run => commands::run_daemon(&config).await,
    }
}
