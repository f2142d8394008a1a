use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use console::style;
use tracing::{info, warn};

use crate::certs;
use crate::cmd::Shell;
use crate::config::DeploymentConfig;
use crate::error::{DeployError, DeployResult};
use crate::nginx;
use crate::paths::HostPaths;
use crate::prompt::Prompter;
use crate::provision::database;
use crate::systemd;

/// Point-in-time health of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// `(unit, state)` as reported by `systemctl is-active`.
    pub services: Vec<(String, String)>,
    pub certificate_days: Option<i64>,
    pub disk: Option<String>,
}

impl MonitorReport {
    #[must_use]
    pub fn all_active(&self) -> bool {
        self.services.iter().all(|(_, state)| state == "active")
    }
}

/// The state word `systemctl is-active` prints. It exits non-zero
/// for anything but "active", so the exit code is not an error here.
fn unit_state(shell: &dyn Shell, unit: &str) -> DeployResult<String> {
    let state = shell.run_unchecked("systemctl", &["is-active", unit])?;
    Ok(if state.is_empty() {
        "unknown".to_string()
    } else {
        state
    })
}

pub fn monitor(
    shell: &dyn Shell,
    config: &DeploymentConfig,
    now: DateTime<Utc>,
) -> DeployResult<MonitorReport> {
    let mut report = MonitorReport::default();

    let mut units = systemd::unit_names(config);
    units.push("nginx".to_string());
    for unit in units {
        let state = unit_state(shell, &unit)?;
        report.services.push((unit, state));
    }

    if config.wants_ssl() {
        match certs::days_left(shell, &config.domain, now) {
            Ok(days) => report.certificate_days = days,
            Err(e) => warn!("cannot read certificate for {}: {e}", config.domain),
        }
    }

    match shell.run("df", &["-h", &config.project_dir]) {
        Ok(out) => report.disk = out.lines().last().map(ToString::to_string),
        Err(e) => warn!("df failed: {e}"),
    }

    print_report(config, &report);
    Ok(report)
}

fn print_report(config: &DeploymentConfig, report: &MonitorReport) {
    println!("\n{}", style(format!("Status of {}", config.project_name)).bold());
    for (unit, state) in &report.services {
        let state = if state == "active" {
            style(state.as_str()).green()
        } else {
            style(state.as_str()).red()
        };
        println!("  {unit:<32} {state}");
    }
    if config.wants_ssl() {
        match report.certificate_days {
            Some(days) if certs::needs_renewal(days) => {
                println!("  certificate: {}", style(format!("{days} days left")).yellow());
            }
            Some(days) => println!("  certificate: {days} days left"),
            None => println!("  certificate: {}", style("none").red()),
        }
    }
    if let Some(disk) = &report.disk {
        println!("  disk: {disk}");
    }
}

/// Page the last journal lines of a chosen unit.
pub fn view_logs(
    shell: &dyn Shell,
    prompter: &dyn Prompter,
    config: &DeploymentConfig,
) -> DeployResult<()> {
    let mut units = systemd::unit_names(config);
    units.push("nginx".to_string());
    let choices: Vec<&str> = units.iter().map(String::as_str).collect();
    let index = prompter.ask_choice("Show logs for", &choices, 0)?;
    let unit = choices
        .get(index)
        .ok_or_else(|| DeployError::Other(format!("no unit at index {index}")))?;

    shell.run_interactive("journalctl", &["-u", unit, "-n", "100", "--no-pager"])
}

/// Restart every unit and reload nginx.
pub fn restart(shell: &dyn Shell, config: &DeploymentConfig) -> DeployResult<()> {
    systemd::restart_all(shell, config)?;
    nginx::reload(shell)
}

/// Remove the deployment after confirmation. Database and account
/// removal are each confirmed separately. Returns whether anything
/// was removed.
pub fn uninstall(
    shell: &dyn Shell,
    prompter: &dyn Prompter,
    paths: &HostPaths,
    config: &DeploymentConfig,
) -> DeployResult<bool> {
    let project = &config.project_name;
    let question = format!("Remove the services and nginx site of {project}?");
    if !prompter.ask_yes_no(&question, false)? {
        info!("uninstall cancelled");
        return Ok(false);
    }

    for unit in systemd::unit_names(config) {
        for action in ["stop", "disable"] {
            if let Err(e) = shell.run("systemctl", &[action, &unit]) {
                warn!("systemctl {action} {unit}: {e}");
            }
        }
        let path = paths.unit_file(&unit);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("removed {}", path.display());
        }
    }
    shell.run("systemctl", &["daemon-reload"])?;
    nginx::remove_site(shell, paths, project)?;

    let question = format!(
        "Drop database {} and role {}? This cannot be undone",
        config.db_name, config.db_user
    );
    if prompter.ask_yes_no(&question, false)? {
        database::drop_database(shell, &config.db_name, &config.db_user)?;
        info!("database {} dropped", config.db_name);
    }

    let question = format!(
        "Delete system user {} and {}?",
        config.system_user, config.project_dir
    );
    if prompter.ask_yes_no(&question, false)? {
        shell.run("userdel", &["--remove", &config.system_user])?;
        if Path::new(&config.project_dir).exists() {
            shell.run("rm", &["-rf", "--", &config.project_dir])?;
        }
        info!("user {} removed", config.system_user);
    }

    Ok(true)
}
