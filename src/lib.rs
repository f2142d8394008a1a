//! Single-host deployment wizard for Django applications.
//!
//! djploy turns a fresh Debian/Ubuntu server into a running Django
//! site: a service account, a checkout of the application, a
//! PostgreSQL role and database, a virtualenv, Gunicorn and Celery
//! under systemd, nginx in front and a certbot certificate - all
//! from one interactive menu or a single flag.
//!
//! # Overview
//!
//! A deployment is driven by a [`Wizard`] that wires together:
//!
//! - A [`DeploymentConfig`] holding every answer, persisted as a
//!   strictly parsed `KEY="value"` file
//! - A [`Shell`] executing host commands (the real [`System`], or a
//!   recording fake in tests)
//! - A [`Prompter`] asking the operator questions (the
//!   [`TerminalPrompter`], or a scripted fake)
//! - [`HostPaths`] naming every location written on the host
//!
//! # Architecture
//!
//! A full deployment follows a three-phase model:
//!
//! 1. **Preflight** - required tools on `PATH` and a recent enough
//!    Python, checked before anything changes
//! 2. **Provision** - idempotent [`Step`]s run in order by a
//!    [`Pipeline`] that stops at the first failure and reports the
//!    steps that completed
//! 3. **Activate** - systemd units and the nginx site are written,
//!    validated (`systemd-analyze verify`, `nginx -t`) and only then
//!    reloaded; a certificate is requested when a domain is set
//!
//! Generated definitions that fail validation are rolled back to the
//! previous working version.
//!
//! # Examples
//!
//! ## Interactive deployment
//!
//! ```rust,no_run
//! use djploy::Wizard;
//!
//! fn main() -> anyhow::Result<()> {
//!     Wizard::new().full_deploy()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Rendering definitions without touching the host
//!
//! ```rust
//! use djploy::{DeploymentConfig, HostPaths, NginxSite, systemd};
//!
//! let mut config = DeploymentConfig::for_project("shop");
//! config.domain = "shop.example.com".into();
//!
//! let site = NginxSite::from_config(&config, &HostPaths::new()).render();
//! assert!(site.contains("location /static/"));
//!
//! let units = systemd::render_units(&config);
//! assert_eq!(units.len(), 1);
//! ```
//!
//! From the command line:
//!
//! ```sh
//! # Interactive menu
//! sudo djploy
//!
//! # Redeploy the saved configuration
//! sudo djploy --deploy
//!
//! # Renew certificates from cron
//! djploy --renew-certs --domains /etc/djploy/domains.conf \
//!     --notify-email ops@example.com
//! ```

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod backup;
pub mod certs;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod install;
pub mod maintenance;
pub mod menu;
pub mod nginx;
pub mod paths;
pub mod pipeline;
pub mod preflight;
pub mod prompt;
pub mod provision;
pub mod secret;
pub mod systemd;
pub mod wizard;

pub use backup::BackupRecord;
pub use certs::DomainCertEntry;
pub use cmd::{Shell, System};
pub use config::{DeployMode, DeploymentConfig};
pub use error::{DeployError, DeployResult};
pub use nginx::NginxSite;
pub use paths::HostPaths;
pub use pipeline::{Pipeline, Step, StepContext};
pub use prompt::{Prompter, TerminalPrompter};
pub use systemd::ServiceUnit;
pub use wizard::Wizard;
