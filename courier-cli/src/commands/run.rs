//! `courier run` — the foreground upload daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use courier_core::config;
use courier_daemon::start_blocking;
use courier_webdav::{RemoteStore, WebdavClient};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/courier/config.json";

/// Arguments for `courier run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config = config::load(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        let client = WebdavClient::new(&config.server_url, &config.username, &config.password)
            .context("invalid server settings")?;
        let store: Arc<dyn RemoteStore> = Arc::new(client);
        start_blocking(config, store).context("daemon exited with error")?;
        Ok(())
    }
}
