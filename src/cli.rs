use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{ArgGroup, Parser};
use tracing::warn;

use crate::error::DeployResult;
use crate::menu;
use crate::paths::HostPaths;
use crate::wizard::Wizard;

/// Single-host Django deployment wizard.
///
/// Without flags an interactive menu starts. Each flag runs one
/// action against the saved configuration.
#[derive(Parser, Debug, Default)]
#[command(name = "djploy", version, about)]
#[command(group(ArgGroup::new("action").multiple(false)))]
pub struct Cli {
    /// Deploy the saved configuration
    #[arg(long, group = "action")]
    pub deploy: bool,

    /// Back up the database, files and service definitions
    #[arg(long, group = "action")]
    pub backup: bool,

    /// Pick a backup and print its restore procedure
    #[arg(long, group = "action")]
    pub restore: bool,

    /// Show service, certificate and disk status
    #[arg(long, group = "action")]
    pub monitor: bool,

    /// Renew certificates listed in the domain registry
    #[arg(long, group = "action")]
    pub renew_certs: bool,

    /// Domain registry for --renew-certs
    #[arg(long, value_name = "FILE")]
    pub domains: Option<PathBuf>,

    /// Where to report renewal failures
    #[arg(long, value_name = "ADDR")]
    pub notify_email: Option<String>,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// What a command line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliAction {
    Interactive,
    Deploy,
    Backup,
    Restore,
    Monitor,
    RenewCerts,
}

impl Cli {
    /// Parse `args`. `--help` and `--version` print and exit;
    /// anything unrecognised falls back to the interactive menu.
    pub fn parse_lenient<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                e.exit()
            }
            Err(e) => {
                let reason = e.to_string();
                let first = reason.lines().next().unwrap_or_default();
                warn!("{first}; starting interactive mode");
                Self::default()
            }
        }
    }

    #[must_use]
    pub const fn action(&self) -> CliAction {
        if self.deploy {
            CliAction::Deploy
        } else if self.backup {
            CliAction::Backup
        } else if self.restore {
            CliAction::Restore
        } else if self.monitor {
            CliAction::Monitor
        } else if self.renew_certs {
            CliAction::RenewCerts
        } else {
            CliAction::Interactive
        }
    }

    #[must_use]
    pub fn host_paths(&self) -> HostPaths {
        let paths = HostPaths::new();
        match &self.config {
            Some(path) => paths.config_file(path),
            None => paths,
        }
    }
}

/// Run what the command line asks for with the real host.
pub fn run(cli: &Cli) -> DeployResult<()> {
    let wizard = Wizard::new().paths(cli.host_paths());
    execute(&wizard, cli)
}

/// Run what the command line asks for with `wizard`.
pub fn execute(wizard: &Wizard, cli: &Cli) -> DeployResult<()> {
    match cli.action() {
        CliAction::Interactive => menu::run(wizard),
        CliAction::Deploy => wizard.deploy_saved().map(|_| ()),
        CliAction::Backup => wizard.backup().map(|_| ()),
        CliAction::Restore => wizard.restore().map(|_| ()),
        CliAction::Monitor => wizard.monitor().map(|_| ()),
        CliAction::RenewCerts => wizard
            .renew_certs(cli.domains.as_deref(), cli.notify_email.as_deref())
            .map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_is_interactive() {
        let cli = Cli::parse_lenient(["djploy"]);
        assert_eq!(cli.action(), CliAction::Interactive);
    }

    #[test]
    fn renew_certs_with_options() {
        let cli = Cli::parse_lenient([
            "djploy",
            "--renew-certs",
            "--domains",
            "/tmp/domains.conf",
            "--notify-email",
            "ops@example.com",
        ]);

        assert_eq!(cli.action(), CliAction::RenewCerts);
        assert_eq!(cli.domains, Some(PathBuf::from("/tmp/domains.conf")));
        assert_eq!(cli.notify_email.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn unknown_flag_falls_back_to_interactive() {
        let cli = Cli::parse_lenient(["djploy", "--frobnicate"]);
        assert_eq!(cli.action(), CliAction::Interactive);
    }

    #[test]
    fn conflicting_actions_fall_back_to_interactive() {
        let cli = Cli::parse_lenient(["djploy", "--deploy", "--backup"]);
        assert_eq!(cli.action(), CliAction::Interactive);
    }

    #[test]
    fn config_flag_overrides_path() {
        let cli = Cli::parse_lenient(["djploy", "--monitor", "--config", "/srv/shop.conf"]);

        assert_eq!(cli.action(), CliAction::Monitor);
        assert_eq!(cli.host_paths().config_file, PathBuf::from("/srv/shop.conf"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
