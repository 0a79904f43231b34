use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};

pub const UNIT_NAME: &str = "courier.service";

/// User unit location, `~/.config/systemd/user/courier.service`.
pub fn unit_path(home: &Path) -> PathBuf {
    home.join(".config/systemd/user").join(UNIT_NAME)
}

/// Generate a systemd user unit that keeps the daemon running.
pub fn generate_unit(binary_path: &Path, config_path: &Path) -> String {
    let binary = binary_path.display().to_string();
    let config = config_path.display().to_string();

    format!(
        r#"[Unit]
Description=Courier WebDAV upload daemon
After=network-online.target
Wants=network-online.target

[Service]
ExecStart={binary} run --config {config}
Restart=on-failure
RestartSec=5

[Install]
WantedBy=default.target
"#,
        binary = binary,
        config = config
    )
}

/// Install and start the systemd user service for the current user.
pub fn install(home: &Path, config_path: &Path) -> Result<PathBuf, DaemonError> {
    ensure_linux()?;

    let unit_dir = home.join(".config/systemd/user");
    if !unit_dir.exists() {
        fs::create_dir_all(&unit_dir).map_err(|e| io_err(&unit_dir, e))?;
    }

    let binary = std::env::current_exe().map_err(|e| io_err("current executable", e))?;
    let unit = unit_path(home);
    fs::write(&unit, generate_unit(&binary, config_path)).map_err(|e| io_err(&unit, e))?;

    run_systemctl(vec!["daemon-reload".to_string()], false)?;
    run_systemctl(
        vec![
            "enable".to_string(),
            "--now".to_string(),
            UNIT_NAME.to_string(),
        ],
        false,
    )?;

    Ok(unit)
}

/// Stop the service and remove its unit file.
pub fn uninstall(home: &Path) -> Result<(), DaemonError> {
    ensure_linux()?;

    let unit = unit_path(home);
    if unit.exists() {
        let _ = run_systemctl(
            vec![
                "disable".to_string(),
                "--now".to_string(),
                UNIT_NAME.to_string(),
            ],
            true,
        );
        fs::remove_file(&unit).map_err(|e| io_err(&unit, e))?;
        run_systemctl(vec!["daemon-reload".to_string()], false)?;
    }

    Ok(())
}

/// Report the unit's activation state as systemd sees it.
pub fn service_state() -> Result<String, DaemonError> {
    ensure_linux()?;

    // `is-active` exits non-zero for anything but "active"; the state name
    // on stdout is what we want either way.
    let output = Command::new("systemctl")
        .arg("--user")
        .args(["is-active", UNIT_NAME])
        .output()
        .map_err(|e| io_err("systemctl", e))?;

    let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if state.is_empty() {
        return Ok("unknown".to_string());
    }
    Ok(state)
}

#[cfg(target_os = "linux")]
fn ensure_linux() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn ensure_linux() -> Result<(), DaemonError> {
    Err(DaemonError::Systemd(
        "systemd management is only supported on Linux".to_string(),
    ))
}

fn run_systemctl(args: Vec<String>, ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new("systemctl")
        .arg("--user")
        .args(args.iter().map(String::as_str))
        .output()
        .map_err(|e| io_err("systemctl", e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Err(DaemonError::Systemd(format!(
        "systemctl failed (status {}): {} {}",
        output.status, stdout, stderr
    )))
}
