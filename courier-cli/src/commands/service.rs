//! `courier service` — systemd user service management.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use courier_daemon::systemd;

use crate::commands::run::DEFAULT_CONFIG_PATH;

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// Install and start the systemd user service.
    Install(InstallArgs),
    /// Stop the service and remove its unit file.
    Uninstall,
    /// Show the service's activation state.
    Status,
}

/// Arguments for `courier service install`.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Config file path written into the unit's ExecStart line.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

pub fn run(command: ServiceCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        ServiceCommand::Install(args) => {
            let path = systemd::install(&home, &args.config)
                .context("failed to install systemd service")?;
            println!("installed systemd service: {}", path.display());
        }
        ServiceCommand::Uninstall => {
            systemd::uninstall(&home).context("failed to uninstall systemd service")?;
            println!("uninstalled systemd service");
        }
        ServiceCommand::Status => {
            let state = systemd::service_state().context("failed to query service state")?;
            println!("{state}");
        }
    }

    Ok(())
}
