use std::path::Path;

use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};
use tracing::{info, warn};

use crate::config::{self, DeployMode, DeploymentConfig};
use crate::error::DeployResult;
use crate::secret;

/// Keys whose values are never echoed.
pub const SECRET_KEYS: &[&str] = &[
    "DB_PASSWORD",
    "EMAIL_USER",
    "EMAIL_PASSWORD",
    "SUPERUSER_PASSWORD",
];

/// Asks the operator questions.
///
/// The pipeline only talks to this trait, so the renderer can be a
/// terminal, a scripted answer list, or anything else.
pub trait Prompter {
    /// Free text. An empty `default` means no suggestion.
    fn ask_text(&self, prompt: &str, default: &str) -> DeployResult<String>;

    /// Masked input; the answer is never echoed.
    fn ask_secret(&self, prompt: &str) -> DeployResult<String>;

    fn ask_yes_no(&self, prompt: &str, default: bool) -> DeployResult<bool>;

    /// Index into `choices`.
    fn ask_choice(&self, prompt: &str, choices: &[&str], default: usize) -> DeployResult<usize>;
}

/// Interactive terminal prompts via `dialoguer`.
#[derive(Default)]
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prompter for TerminalPrompter {
    fn ask_text(&self, prompt: &str, default: &str) -> DeployResult<String> {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true);
        if !default.is_empty() {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }

    fn ask_secret(&self, prompt: &str) -> DeployResult<String> {
        Ok(Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?)
    }

    fn ask_yes_no(&self, prompt: &str, default: bool) -> DeployResult<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    fn ask_choice(&self, prompt: &str, choices: &[&str], default: usize) -> DeployResult<usize> {
        Ok(Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(choices)
            .default(default)
            .interact()?)
    }
}

fn ask_until(
    prompter: &dyn Prompter,
    prompt: &str,
    default: &str,
    hint: &str,
    valid: impl Fn(&str) -> bool,
) -> DeployResult<String> {
    loop {
        let answer = prompter.ask_text(prompt, default)?;
        if valid(&answer) {
            return Ok(answer);
        }
        warn!("{hint}");
    }
}

/// A number no smaller than `min`.
fn ask_number<T: std::str::FromStr + std::fmt::Display + PartialOrd + Copy>(
    prompter: &dyn Prompter,
    prompt: &str,
    default: T,
    min: T,
) -> DeployResult<T> {
    let hint = format!("expected a number of at least {min}");
    let answer = ask_until(prompter, prompt, &default.to_string(), &hint, |a| {
        a.parse::<T>().is_ok_and(|n| n >= min)
    })?;
    Ok(answer.parse().unwrap_or(default))
}

/// Masked input; a blank answer keeps `current` when there is one.
fn ask_secret_keep(prompter: &dyn Prompter, prompt: &str, current: &str) -> DeployResult<String> {
    let prompt = if current.is_empty() {
        prompt.to_string()
    } else {
        format!("{prompt} (blank keeps current)")
    };
    let answer = prompter.ask_secret(&prompt)?;
    Ok(if answer.is_empty() {
        current.to_string()
    } else {
        answer
    })
}

fn ask_required_secret(prompter: &dyn Prompter, prompt: &str, current: &str) -> DeployResult<String> {
    loop {
        let answer = ask_secret_keep(prompter, prompt, current)?;
        if !answer.is_empty() {
            return Ok(answer);
        }
        warn!("a value is required");
    }
}

/// Walk the configuration questions in order.
///
/// Defaults come from `previous` when it describes the same project,
/// otherwise from values derived from the project name.
pub fn ask_config(
    prompter: &dyn Prompter,
    previous: Option<&DeploymentConfig>,
) -> DeployResult<DeploymentConfig> {
    let name = ask_until(
        prompter,
        "Project name (Django package)",
        previous.map_or("", |c| c.project_name.as_str()),
        "use lowercase letters, digits and underscores, starting with a letter",
        config::is_identifier,
    )?;

    let mut c = match previous {
        Some(prev) if prev.project_name == name => prev.clone(),
        _ => DeploymentConfig::for_project(&name),
    };

    c.system_user = ask_until(
        prompter,
        "System user",
        &c.system_user,
        "use lowercase letters, digits and underscores",
        config::is_identifier,
    )?;
    let dir_default = if c.project_dir.is_empty() || previous.is_none() {
        format!("/home/{}/{name}", c.system_user)
    } else {
        c.project_dir.clone()
    };
    c.project_dir = ask_until(
        prompter,
        "Project directory",
        &dir_default,
        "use an absolute path",
        |a| a.starts_with('/'),
    )?;
    c.repo_url = ask_until(prompter, "Git repository URL", &c.repo_url, "a repository is required", |a| {
        !a.is_empty()
    })?;
    c.repo_branch = ask_until(prompter, "Branch", &c.repo_branch, "a branch is required", |a| {
        !a.is_empty()
    })?;

    let modes = [DeployMode::Production, DeployMode::Development];
    let labels: Vec<&str> = modes.iter().map(|m| m.as_str()).collect();
    let current = modes.iter().position(|m| *m == c.mode).unwrap_or(0);
    c.mode = modes[prompter.ask_choice("Deployment mode", &labels, current)?];

    c.db_name = ask_until(prompter, "Database name", &c.db_name, "use [a-z][a-z0-9_]*", config::is_identifier)?;
    c.db_user = ask_until(prompter, "Database user", &c.db_user, "use [a-z][a-z0-9_]*", config::is_identifier)?;
    c.db_password = ask_secret_keep(prompter, "Database password (blank generates one)", &c.db_password)?;
    if c.db_password.is_empty() {
        c.db_password = secret::password(24);
        info!("generated a random database password");
    }

    c.gunicorn_workers = ask_number(prompter, "Gunicorn workers", c.gunicorn_workers, 1)?;

    c.use_celery = prompter.ask_yes_no("Run Celery background workers?", c.use_celery)?;
    if c.use_celery {
        c.use_celery_beat = prompter.ask_yes_no("Run Celery beat scheduler?", c.use_celery_beat)?;
        c.broker_url = ask_until(prompter, "Broker URL", &c.broker_url, "a broker URL is required", |a| {
            !a.is_empty()
        })?;
    } else {
        c.use_celery_beat = false;
    }

    c.domain = ask_until(
        prompter,
        "Domain (blank for none)",
        &c.domain,
        "enter a host name such as app.example.com",
        |a| a.is_empty() || config::is_domain(a),
    )?;
    if c.has_domain() {
        c.enable_ssl = prompter.ask_yes_no("Request a Let's Encrypt certificate?", true)?;
        if c.enable_ssl {
            c.ssl_email = ask_until(prompter, "Certificate contact email", &c.ssl_email, "enter an email address", config::is_email)?;
        }
    } else {
        c.enable_ssl = false;
    }

    c.use_email = prompter.ask_yes_no("Configure outgoing email?", c.use_email)?;
    if c.use_email {
        c.email_host = ask_until(prompter, "SMTP host", &c.email_host, "a host is required", |a| !a.is_empty())?;
        c.email_port = ask_number(prompter, "SMTP port", c.email_port, 1)?;
        c.email_use_tls = prompter.ask_yes_no("Use TLS?", c.email_use_tls)?;
        c.email_user = ask_secret_keep(prompter, "SMTP user", &c.email_user)?;
        c.email_password = ask_secret_keep(prompter, "SMTP password", &c.email_password)?;
        c.default_from_email = prompter.ask_text("Default from address", &c.default_from_email)?;
    } else {
        let defaults = DeploymentConfig::default();
        c.email_host = defaults.email_host;
        c.email_port = defaults.email_port;
        c.email_use_tls = defaults.email_use_tls;
        c.email_user = defaults.email_user;
        c.email_password = defaults.email_password;
        c.default_from_email = defaults.default_from_email;
    }

    c.create_superuser = prompter.ask_yes_no("Create a Django superuser?", c.create_superuser)?;
    if c.create_superuser {
        c.superuser_name = ask_until(prompter, "Superuser name", &c.superuser_name, "a name is required", |a| {
            !a.is_empty()
        })?;
        c.superuser_email = ask_until(prompter, "Superuser email", &c.superuser_email, "enter an email address", config::is_email)?;
        c.superuser_password = ask_required_secret(prompter, "Superuser password", &c.superuser_password)?;
    }

    Ok(c)
}

/// Human-readable listing with secrets masked.
#[must_use]
pub fn summary(config: &DeploymentConfig) -> String {
    let mut out = String::new();
    for (key, value) in config.entries() {
        let shown = if SECRET_KEYS.contains(&key) && !value.is_empty() {
            "********".to_string()
        } else {
            value
        };
        out.push_str(&format!("  {key:<20} {shown}\n"));
    }
    out
}

/// Final step of the sequence: show the result and offer to save
/// it. Returns whether it was saved; a discarded config stays
/// usable for the current run.
pub fn confirm_and_save(
    prompter: &dyn Prompter,
    config: &DeploymentConfig,
    path: &Path,
) -> DeployResult<bool> {
    eprintln!();
    eprintln!("{}", style("Deployment configuration").cyan().bold());
    eprint!("{}", summary(config));
    eprintln!();

    if prompter.ask_yes_no(&format!("Save configuration to {}?", path.display()), true)? {
        config.save(path)?;
        info!("configuration saved to {}", path.display());
        Ok(true)
    } else {
        warn!("configuration discarded; it will be used for this run only");
        Ok(false)
    }
}
