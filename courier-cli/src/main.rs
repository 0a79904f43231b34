//! Courier — WebDAV upload daemon CLI.
//!
//! # Usage
//!
//! ```text
//! courier run [--config <path>]
//! courier check [--config <path>] [--json]
//! courier service install [--config <path>]
//! courier service uninstall
//! courier service status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, run::RunArgs, service::ServiceCommand};

#[derive(Parser, Debug)]
#[command(
    name = "courier",
    version,
    about = "Watch local directories and upload quiescent files to a WebDAV store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the upload daemon in the foreground.
    Run(RunArgs),

    /// Validate the configuration and probe the remote store.
    Check(CheckArgs),

    /// Manage the systemd user service.
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Service { command } => commands::service::run(command),
    }
}
