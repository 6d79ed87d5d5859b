use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Arbor - client-side sync engine for message trees", long_about = None)]
struct Cli {
    /// Path to config.toml (defaults to the per-user config file)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay newline-delimited change envelopes into a fresh session
    Replay {
        /// File with one JSON envelope per line
        file: PathBuf,

        /// Identity id of the session owner
        #[arg(long, default_value = "arbor:///identities/local")]
        owner: String,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let service = commands::utils::config_service(cli.config.as_deref());
    let config = service.get_config();
    arbor_infrastructure::init_tracing(&config.logging);

    match cli.command {
        Commands::Replay { file, owner } => commands::replay::run(&file, owner, config)?,
        Commands::Config => commands::config::show(&config)?,
    }

    Ok(())
}
