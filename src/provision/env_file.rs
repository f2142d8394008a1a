use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use tracing::info;

use crate::config::DeploymentConfig;
use crate::error::DeployResult;
use crate::install;
use crate::pipeline::{Step, StepContext};
use crate::secret;

/// Write the application's `.env`.
pub struct EnvFile;

impl Step for EnvFile {
    fn name(&self) -> &'static str {
        "env-file"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let c = ctx.config;
        let dir = Path::new(&c.project_dir);
        let example = fs::read_to_string(dir.join(".env.example")).ok();
        let existing = fs::read_to_string(c.env_file()).ok();

        let secret_key = existing
            .as_deref()
            .and_then(|e| parse(e).shift_remove("SECRET_KEY"))
            .filter(|k| !k.is_empty())
            .unwrap_or_else(secret::django_secret_key);

        let vars = merge(c, example.as_deref(), &secret_key);
        let path = c.env_file();
        install::write_private(Path::new(&path), render(&vars).as_bytes())?;

        let owner = format!("{0}:{0}", c.system_user);
        ctx.shell.run("chown", &[&owner, &path])?;
        info!("wrote {path} ({} variables)", vars.len());
        Ok(())
    }
}

/// `.env.example` values first, generated values on top, in a
/// stable order.
#[must_use]
pub fn merge(
    config: &DeploymentConfig,
    example: Option<&str>,
    secret_key: &str,
) -> IndexMap<String, String> {
    let mut vars = example.map(parse).unwrap_or_default();
    for (key, value) in generated(config, secret_key) {
        vars.insert(key.to_string(), value);
    }
    vars
}

fn generated(c: &DeploymentConfig, secret_key: &str) -> Vec<(&'static str, String)> {
    let mut hosts = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    if c.has_domain() {
        hosts.insert(0, c.domain.clone());
    }

    let mut vars = vec![
        ("SECRET_KEY", secret_key.to_string()),
        ("DEBUG", python_bool(c.mode.debug())),
        ("ALLOWED_HOSTS", hosts.join(",")),
        ("DATABASE_URL", c.database_url()),
        ("DB_NAME", c.db_name.clone()),
        ("DB_USER", c.db_user.clone()),
        ("DB_PASSWORD", c.db_password.clone()),
        ("DB_HOST", c.db_host.clone()),
        ("DB_PORT", c.db_port.to_string()),
        ("STATIC_ROOT", c.static_root()),
        ("MEDIA_ROOT", c.media_root()),
    ];

    if c.has_domain() {
        let scheme = if c.wants_ssl() { "https" } else { "http" };
        vars.push(("CSRF_TRUSTED_ORIGINS", format!("{scheme}://{}", c.domain)));
    }

    if c.use_email {
        vars.extend([
            ("EMAIL_HOST", c.email_host.clone()),
            ("EMAIL_PORT", c.email_port.to_string()),
            ("EMAIL_USE_TLS", python_bool(c.email_use_tls)),
            ("EMAIL_HOST_USER", c.email_user.clone()),
            ("EMAIL_HOST_PASSWORD", c.email_password.clone()),
            ("DEFAULT_FROM_EMAIL", c.default_from_email.clone()),
        ]);
    }

    if c.use_celery {
        vars.push(("CELERY_BROKER_URL", c.broker_url.clone()));
    }

    vars
}

fn python_bool(value: bool) -> String {
    let text = if value { "True" } else { "False" };
    text.to_string()
}

/// Parse `KEY=value` lines. Comments, blanks and lines without `=`
/// are skipped; surrounding quotes are removed.
#[must_use]
pub fn parse(content: &str) -> IndexMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.strip_prefix("export ").unwrap_or(l).split_once('='))
        .map(|(k, v)| (k.trim().to_string(), unquote(v.trim())))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            if quote == '"' {
                return inner.replace("\\\"", "\"").replace("\\\\", "\\");
            }
            return inner.to_string();
        }
    }
    value.to_string()
}

/// Render as `KEY=value`, double-quoting values that need it.
#[must_use]
pub fn render(vars: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in vars {
        let plain = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-:/@,+".contains(c));
        if plain {
            out.push_str(&format!("{key}={value}\n"));
        } else {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            out.push_str(&format!("{key}=\"{escaped}\"\n"));
        }
    }
    out
}
