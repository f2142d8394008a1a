use std::path::Path;

use chrono::Utc;
use console::style;
use tracing::{info, warn};

use crate::backup::{self, BackupRecord};
use crate::certs::{self, RenewalReport};
use crate::cmd::{Shell, System};
use crate::config::DeploymentConfig;
use crate::error::{DeployError, DeployResult};
use crate::maintenance::{self, MonitorReport};
use crate::paths::HostPaths;
use crate::pipeline::{PipelineReport, StepContext};
use crate::preflight::{self, REQUIRED_TOOLS};
use crate::prompt::{self, Prompter, TerminalPrompter};
use crate::provision::{self, database};

/// Deployment wizard wiring the host shell, the operator prompts and
/// the host layout to every action the menu and flags expose.
///
/// # Example
///
/// ```rust,no_run
/// use djploy::{HostPaths, Wizard};
///
/// fn main() -> anyhow::Result<()> {
///     let wizard = Wizard::new().paths(HostPaths::new());
///     wizard.full_deploy()?;
///     Ok(())
/// }
/// ```
pub struct Wizard {
    shell: Box<dyn Shell>,
    prompter: Box<dyn Prompter>,
    paths: HostPaths,
    progress: bool,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: Box::new(System),
            prompter: Box::new(TerminalPrompter::new()),
            paths: HostPaths::new(),
            progress: true,
        }
    }

    #[must_use]
    pub fn shell(mut self, shell: impl Shell + 'static) -> Self {
        self.shell = Box::new(shell);
        self
    }

    #[must_use]
    pub fn prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    #[must_use]
    pub fn paths(mut self, paths: HostPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Hide progress bars.
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    #[must_use]
    pub fn host_paths(&self) -> &HostPaths {
        &self.paths
    }

    pub(crate) fn prompts(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    /// The saved configuration, validated.
    pub fn load_config(&self) -> DeployResult<DeploymentConfig> {
        let path = &self.paths.config_file;
        let config = DeploymentConfig::load(path)?
            .ok_or_else(|| DeployError::ConfigMissing(path.display().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Ask every question, defaulting to the saved answers, then
    /// offer to save.
    pub fn configure(&self) -> DeployResult<DeploymentConfig> {
        let previous = match DeploymentConfig::load(&self.paths.config_file) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("ignoring saved configuration: {e}");
                None
            }
        };
        let config = prompt::ask_config(self.prompts(), previous.as_ref())?;
        config.validate()?;
        prompt::confirm_and_save(self.prompts(), &config, &self.paths.config_file)?;
        Ok(config)
    }

    /// Required tools for `config`: certbot only matters with SSL.
    pub fn preflight(&self, config: &DeploymentConfig) -> DeployResult<()> {
        let mut tools = REQUIRED_TOOLS.to_vec();
        if config.wants_ssl() {
            tools.push("certbot");
        }
        preflight::check(self.shell.as_ref(), &tools).into_result()?;
        Ok(())
    }

    /// Configure interactively, then deploy.
    pub fn full_deploy(&self) -> DeployResult<PipelineReport> {
        let config = self.configure()?;
        self.deploy(&config)
    }

    /// Deploy the saved configuration without asking anything.
    pub fn deploy_saved(&self) -> DeployResult<PipelineReport> {
        let config = self.load_config()?;
        self.deploy(&config)
    }

    /// Preflight, a backup when redeploying over an existing
    /// installation, then every provisioning step.
    pub fn deploy(&self, config: &DeploymentConfig) -> DeployResult<PipelineReport> {
        config.validate()?;
        self.preflight(config)?;

        if self.is_deployed(config)? {
            let record =
                backup::create_backup(self.shell.as_ref(), &self.paths, config, Utc::now())?;
            info!("pre-deploy backup at {}", record.path.display());
        }

        let mut pipeline = provision::deploy_pipeline(config);
        if !self.progress {
            pipeline = pipeline.quiet();
        }
        let report = pipeline.run(&self.context(config))?;

        let url = if config.wants_ssl() {
            format!("https://{}", config.domain)
        } else if config.has_domain() {
            format!("http://{}", config.domain)
        } else {
            "http://<server address>".to_string()
        };
        println!(
            "\n{} {} is deployed at {url}",
            style("✓").green(),
            config.project_name
        );
        Ok(report)
    }

    /// Back up, then pull and restart.
    pub fn update(&self) -> DeployResult<PipelineReport> {
        let config = self.load_config()?;
        self.preflight(&config)?;
        let record = backup::create_backup(self.shell.as_ref(), &self.paths, &config, Utc::now())?;
        info!("pre-update backup at {}", record.path.display());

        let mut pipeline = provision::update_pipeline();
        if !self.progress {
            pipeline = pipeline.quiet();
        }
        pipeline.run(&self.context(&config))
    }

    pub fn backup(&self) -> DeployResult<BackupRecord> {
        let config = self.load_config()?;
        let record = backup::create_backup(self.shell.as_ref(), &self.paths, &config, Utc::now())?;
        println!("Backup written to {}", record.path.display());
        Ok(record)
    }

    pub fn restore(&self) -> DeployResult<Option<BackupRecord>> {
        let config = self.load_config()?;
        backup::restore(self.prompts(), &self.paths, &config)
    }

    pub fn monitor(&self) -> DeployResult<MonitorReport> {
        let config = self.load_config()?;
        maintenance::monitor(self.shell.as_ref(), &config, Utc::now())
    }

    pub fn view_logs(&self) -> DeployResult<()> {
        let config = self.load_config()?;
        maintenance::view_logs(self.shell.as_ref(), self.prompts(), &config)
    }

    pub fn restart(&self) -> DeployResult<()> {
        let config = self.load_config()?;
        maintenance::restart(self.shell.as_ref(), &config)
    }

    pub fn uninstall(&self) -> DeployResult<bool> {
        let config = self.load_config()?;
        maintenance::uninstall(self.shell.as_ref(), self.prompts(), &self.paths, &config)
    }

    /// Renew every registered certificate. `registry` overrides the
    /// default domain registry.
    pub fn renew_certs(
        &self,
        registry: Option<&Path>,
        notify_email: Option<&str>,
    ) -> DeployResult<RenewalReport> {
        let paths = match registry {
            Some(path) => self.paths.clone().domain_registry(path),
            None => self.paths.clone(),
        };
        certs::run_renewal(self.shell.as_ref(), &paths, notify_email, Utc::now())
    }

    /// A checkout or a database already exists for `config`.
    fn is_deployed(&self, config: &DeploymentConfig) -> DeployResult<bool> {
        if Path::new(&config.project_dir).join(".git").is_dir() {
            return Ok(true);
        }
        database::database_exists(self.shell.as_ref(), &config.db_name)
    }

    fn context<'a>(&'a self, config: &'a DeploymentConfig) -> StepContext<'a> {
        StepContext::new(config, self.shell.as_ref(), &self.paths)
    }
}
