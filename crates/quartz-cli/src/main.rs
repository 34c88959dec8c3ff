//! Quartz CLI - run, inspect and check peripheral clock topologies.

mod commands;
mod devices;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quartz")]
#[command(author, version, about = "Quartz peripheral clock scheduler CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a topology in real time
    Run(commands::run::RunArgs),

    /// Compile a topology and print its schedule
    Inspect(commands::inspect::InspectArgs),

    /// Validate a topology file without running it
    Check(commands::check::CheckArgs),

    /// Write the bundled demo topology to a file
    Init(commands::init::InitArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Init(args) => commands::init::run(args),
    }
}
