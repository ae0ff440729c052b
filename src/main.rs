mod commands;
mod registry;
mod render;
mod utils;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asana2calendar", version)]
#[command(about = "Keep Asana tasks and calendar events in sync, in both directions")]
struct Cli {
    /// Log what every pass does to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show paths and adapters, writing a config template if none exists
    Config,
    /// Create the link store for the enabled adapters
    Init {
        /// Discard an existing store and every link in it
        #[arg(long)]
        force: bool,
    },
    /// Run one sync pass across all enabled adapters
    Sync {
        /// Sync events from this date (YYYY-MM-DD, or "start" for all past events)
        #[arg(long)]
        from: Option<String>,

        /// Sync events until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// List linked records
    Links,
    /// Forget a link and its cached copies. The records themselves are kept.
    Unlink {
        /// Link id, as shown by `links`
        id: i64,
    },
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "warn,asana2calendar=debug,asana2calendar_core=debug,asana2calendar_provider_asana=debug,asana2calendar_provider_caldav=debug" } else { "warn" })
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Config => commands::config::run().map(|_| ExitCode::SUCCESS),
        Commands::Init { force } => commands::init::run(force).map(|_| ExitCode::SUCCESS),
        Commands::Sync { from, to } => commands::sync::run(from.as_deref(), to.as_deref()).await,
        Commands::Links => commands::links::run().map(|_| ExitCode::SUCCESS),
        Commands::Unlink { id } => commands::unlink::run(id).map(|_| ExitCode::SUCCESS),
    }
}
