//! `courier check` — configuration and connectivity preflight.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use courier_core::config;
use courier_webdav::{RemoteStore, WebdavClient};

use crate::commands::run::DEFAULT_CONFIG_PATH;

/// Arguments for `courier check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
struct CheckReport {
    server_url: String,
    reachable: bool,
    connection_error: Option<String>,
    mappings: Vec<MappingCheck>,
}

#[derive(Debug)]
struct MappingCheck {
    local: String,
    remote: String,
    local_present: bool,
}

#[derive(Serialize)]
struct CheckReportJson {
    server_url: String,
    reachable: bool,
    connection_error: Option<String>,
    directories: Vec<MappingCheckJson>,
}

#[derive(Serialize)]
struct MappingCheckJson {
    local: String,
    remote: String,
    local_present: bool,
}

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "status")]
    status: String,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let config = config::load(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        let client = WebdavClient::new(&config.server_url, &config.username, &config.password)
            .context("invalid server settings")?;

        let connection_error = client.test_connection().err().map(|err| err.to_string());
        let mappings = config
            .directories
            .iter()
            .map(|mapping| MappingCheck {
                local: mapping.local.display().to_string(),
                remote: mapping.remote.clone(),
                local_present: mapping.local.is_dir(),
            })
            .collect();

        let report = CheckReport {
            server_url: config.server_url.clone(),
            reachable: connection_error.is_none(),
            connection_error,
            mappings,
        };
        let usable = report.mappings.iter().filter(|m| m.local_present).count();

        if self.json {
            print_json(&report)?;
        } else {
            print_report(&report);
        }

        if !report.reachable {
            anyhow::bail!("remote store is unreachable");
        }
        if usable == 0 {
            anyhow::bail!("no usable local directories");
        }
        Ok(())
    }
}

fn print_json(report: &CheckReport) -> Result<()> {
    let payload = CheckReportJson {
        server_url: report.server_url.clone(),
        reachable: report.reachable,
        connection_error: report.connection_error.clone(),
        directories: report
            .mappings
            .iter()
            .map(|mapping| MappingCheckJson {
                local: mapping.local.clone(),
                remote: mapping.remote.clone(),
                local_present: mapping.local_present,
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize check JSON")?
    );
    Ok(())
}

fn print_report(report: &CheckReport) {
    println!(
        "Courier v{} | {}",
        env!("CARGO_PKG_VERSION"),
        report.server_url,
    );
    if report.reachable {
        println!("server: {}", "reachable".green().bold());
    } else {
        let detail = report
            .connection_error
            .as_deref()
            .unwrap_or("unknown error");
        println!("server: {} ({detail})", "unreachable".red().bold());
    }

    let rows: Vec<MappingRow> = report
        .mappings
        .iter()
        .map(|mapping| MappingRow {
            local: mapping.local.clone(),
            remote: mapping.remote.clone(),
            status: if mapping.local_present {
                "ok".to_string()
            } else {
                "missing".to_string()
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if report.mappings.iter().any(|m| !m.local_present) {
        println!("Missing local directories are skipped at daemon startup.");
    }
}
