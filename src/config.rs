use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::error::{DeployError, DeployResult};
use crate::install;

/// Whether the application runs with production settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    #[default]
    Production,
    Development,
}

impl DeployMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }

    #[must_use]
    pub const fn debug(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "development" => Ok(Self::Development),
            other => Err(format!("unknown deployment mode '{other}'")),
        }
    }
}

/// Every parameter of a deployment.
///
/// Built by the prompt sequencer or loaded from disk, validated
/// once, then handed to each provisioning step by reference.
///
/// # Example
///
/// ```
/// use djploy::DeploymentConfig;
///
/// let config = DeploymentConfig::for_project("shop");
///
/// assert_eq!(config.db_name, "shop_db");
/// assert_eq!(config.socket_path(), "/run/shop/shop.sock");
/// assert!(!config.use_celery);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub project_name: String,
    pub system_user: String,
    pub project_dir: String,
    pub repo_url: String,
    pub repo_branch: String,
    pub mode: DeployMode,

    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_host: String,
    pub db_port: u16,

    pub gunicorn_workers: u32,
    pub use_celery: bool,
    pub use_celery_beat: bool,
    pub broker_url: String,

    pub domain: String,
    pub enable_ssl: bool,
    pub ssl_email: String,

    pub use_email: bool,
    pub email_host: String,
    pub email_port: u16,
    pub email_use_tls: bool,
    pub email_user: String,
    pub email_password: String,
    pub default_from_email: String,

    pub create_superuser: bool,
    pub superuser_name: String,
    pub superuser_email: String,
    pub superuser_password: String,
}

/// Recognised keys of the configuration file, in file order.
pub const KEYS: &[&str] = &[
    "PROJECT_NAME",
    "SYSTEM_USER",
    "PROJECT_DIR",
    "REPO_URL",
    "REPO_BRANCH",
    "DEPLOY_MODE",
    "DB_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_HOST",
    "DB_PORT",
    "GUNICORN_WORKERS",
    "USE_CELERY",
    "USE_CELERY_BEAT",
    "BROKER_URL",
    "DOMAIN",
    "ENABLE_SSL",
    "SSL_EMAIL",
    "USE_EMAIL",
    "EMAIL_HOST",
    "EMAIL_PORT",
    "EMAIL_USE_TLS",
    "EMAIL_USER",
    "EMAIL_PASSWORD",
    "DEFAULT_FROM_EMAIL",
    "CREATE_SUPERUSER",
    "SUPERUSER_NAME",
    "SUPERUSER_EMAIL",
    "SUPERUSER_PASSWORD",
];

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            system_user: String::new(),
            project_dir: String::new(),
            repo_url: String::new(),
            repo_branch: "main".to_string(),
            mode: DeployMode::Production,
            db_name: String::new(),
            db_user: String::new(),
            db_password: String::new(),
            db_host: "localhost".to_string(),
            db_port: 5432,
            gunicorn_workers: 3,
            use_celery: false,
            use_celery_beat: false,
            broker_url: String::new(),
            domain: String::new(),
            enable_ssl: false,
            ssl_email: String::new(),
            use_email: false,
            email_host: String::new(),
            email_port: 587,
            email_use_tls: true,
            email_user: String::new(),
            email_password: String::new(),
            default_from_email: String::new(),
            create_superuser: false,
            superuser_name: String::new(),
            superuser_email: String::new(),
            superuser_password: String::new(),
        }
    }
}

impl DeploymentConfig {
    /// A configuration with every default derived from the project
    /// name.
    #[must_use]
    pub fn for_project(name: &str) -> Self {
        Self {
            project_name: name.to_string(),
            system_user: name.to_string(),
            project_dir: format!("/home/{name}/{name}"),
            db_name: format!("{name}_db"),
            db_user: format!("{name}_user"),
            superuser_name: "admin".to_string(),
            broker_url: "redis://127.0.0.1:6379/0".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_domain(&self) -> bool {
        !self.domain.is_empty()
    }

    #[must_use]
    pub fn wants_ssl(&self) -> bool {
        self.has_domain() && self.enable_ssl
    }

    #[must_use]
    pub fn runtime_dir(&self) -> String {
        format!("/run/{}", self.project_name)
    }

    /// Unix socket Gunicorn binds and nginx proxies to.
    #[must_use]
    pub fn socket_path(&self) -> String {
        format!("{}/{}.sock", self.runtime_dir(), self.project_name)
    }

    #[must_use]
    pub fn venv_dir(&self) -> String {
        format!("{}/venv", self.project_dir)
    }

    #[must_use]
    pub fn venv_bin(&self, program: &str) -> String {
        format!("{}/bin/{program}", self.venv_dir())
    }

    #[must_use]
    pub fn manage_py(&self) -> String {
        format!("{}/manage.py", self.project_dir)
    }

    #[must_use]
    pub fn env_file(&self) -> String {
        format!("{}/.env", self.project_dir)
    }

    #[must_use]
    pub fn static_root(&self) -> String {
        format!("{}/public/static", self.project_dir)
    }

    #[must_use]
    pub fn media_root(&self) -> String {
        format!("{}/public/media", self.project_dir)
    }

    #[must_use]
    pub fn wsgi_app(&self) -> String {
        format!("{}.wsgi:application", self.project_name)
    }

    /// `DATABASE_URL` for the application, credentials
    /// percent-encoded.
    #[must_use]
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            percent_encode(&self.db_user),
            percent_encode(&self.db_password),
            self.db_host,
            self.db_port,
            self.db_name
        )
    }

    /// Check required fields and formats before any step runs.
    pub fn validate(&self) -> DeployResult<()> {
        let mut problems = Vec::new();

        if !is_identifier(&self.project_name) {
            problems.push(format!(
                "PROJECT_NAME '{}' must match [a-z][a-z0-9_]*",
                self.project_name
            ));
        }
        for (key, value) in [
            ("SYSTEM_USER", &self.system_user),
            ("PROJECT_DIR", &self.project_dir),
            ("REPO_URL", &self.repo_url),
            ("REPO_BRANCH", &self.repo_branch),
            ("DB_NAME", &self.db_name),
            ("DB_USER", &self.db_user),
            ("DB_PASSWORD", &self.db_password),
        ] {
            if value.is_empty() {
                problems.push(format!("{key} is required"));
            }
        }
        if !self.project_dir.is_empty() && !self.project_dir.starts_with('/') {
            problems.push("PROJECT_DIR must be an absolute path".to_string());
        }
        for (key, value) in [("DB_NAME", &self.db_name), ("DB_USER", &self.db_user)] {
            if !value.is_empty() && !is_identifier(value) {
                problems.push(format!("{key} '{value}' must match [a-z][a-z0-9_]*"));
            }
        }
        if self.gunicorn_workers == 0 {
            problems.push("GUNICORN_WORKERS must be at least 1".to_string());
        }
        if self.use_celery && self.broker_url.is_empty() {
            problems.push("BROKER_URL is required when Celery is enabled".to_string());
        }
        if self.has_domain() && !is_domain(&self.domain) {
            problems.push(format!("DOMAIN '{}' is not a valid host name", self.domain));
        }
        if self.wants_ssl() && !is_email(&self.ssl_email) {
            problems.push("SSL_EMAIL must be an email address when SSL is enabled".to_string());
        }
        if self.use_email && self.email_host.is_empty() {
            problems.push("EMAIL_HOST is required when email is enabled".to_string());
        }
        if self.create_superuser {
            if self.superuser_name.is_empty() || self.superuser_password.is_empty() {
                problems.push("SUPERUSER_NAME and SUPERUSER_PASSWORD are required".to_string());
            }
            if !is_email(&self.superuser_email) {
                problems.push("SUPERUSER_EMAIL must be an email address".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DeployError::ConfigInvalid(problems.join("; ")))
        }
    }

    /// Every recognised field as `(KEY, value)` in file order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PROJECT_NAME", self.project_name.clone()),
            ("SYSTEM_USER", self.system_user.clone()),
            ("PROJECT_DIR", self.project_dir.clone()),
            ("REPO_URL", self.repo_url.clone()),
            ("REPO_BRANCH", self.repo_branch.clone()),
            ("DEPLOY_MODE", self.mode.to_string()),
            ("DB_NAME", self.db_name.clone()),
            ("DB_USER", self.db_user.clone()),
            ("DB_PASSWORD", self.db_password.clone()),
            ("DB_HOST", self.db_host.clone()),
            ("DB_PORT", self.db_port.to_string()),
            ("GUNICORN_WORKERS", self.gunicorn_workers.to_string()),
            ("USE_CELERY", self.use_celery.to_string()),
            ("USE_CELERY_BEAT", self.use_celery_beat.to_string()),
            ("BROKER_URL", self.broker_url.clone()),
            ("DOMAIN", self.domain.clone()),
            ("ENABLE_SSL", self.enable_ssl.to_string()),
            ("SSL_EMAIL", self.ssl_email.clone()),
            ("USE_EMAIL", self.use_email.to_string()),
            ("EMAIL_HOST", self.email_host.clone()),
            ("EMAIL_PORT", self.email_port.to_string()),
            ("EMAIL_USE_TLS", self.email_use_tls.to_string()),
            ("EMAIL_USER", self.email_user.clone()),
            ("EMAIL_PASSWORD", self.email_password.clone()),
            ("DEFAULT_FROM_EMAIL", self.default_from_email.clone()),
            ("CREATE_SUPERUSER", self.create_superuser.to_string()),
            ("SUPERUSER_NAME", self.superuser_name.clone()),
            ("SUPERUSER_EMAIL", self.superuser_email.clone()),
            ("SUPERUSER_PASSWORD", self.superuser_password.clone()),
        ]
    }

    /// Assign one field from its textual form.
    fn set(&mut self, key: &str, value: String) -> Result<(), String> {
        match key {
            "PROJECT_NAME" => self.project_name = value,
            "SYSTEM_USER" => self.system_user = value,
            "PROJECT_DIR" => self.project_dir = value,
            "REPO_URL" => self.repo_url = value,
            "REPO_BRANCH" => self.repo_branch = value,
            "DEPLOY_MODE" => self.mode = value.parse()?,
            "DB_NAME" => self.db_name = value,
            "DB_USER" => self.db_user = value,
            "DB_PASSWORD" => self.db_password = value,
            "DB_HOST" => self.db_host = value,
            "DB_PORT" => self.db_port = parse_number(key, &value)?,
            "GUNICORN_WORKERS" => self.gunicorn_workers = parse_number(key, &value)?,
            "USE_CELERY" => self.use_celery = parse_bool(key, &value)?,
            "USE_CELERY_BEAT" => self.use_celery_beat = parse_bool(key, &value)?,
            "BROKER_URL" => self.broker_url = value,
            "DOMAIN" => self.domain = value,
            "ENABLE_SSL" => self.enable_ssl = parse_bool(key, &value)?,
            "SSL_EMAIL" => self.ssl_email = value,
            "USE_EMAIL" => self.use_email = parse_bool(key, &value)?,
            "EMAIL_HOST" => self.email_host = value,
            "EMAIL_PORT" => self.email_port = parse_number(key, &value)?,
            "EMAIL_USE_TLS" => self.email_use_tls = parse_bool(key, &value)?,
            "EMAIL_USER" => self.email_user = value,
            "EMAIL_PASSWORD" => self.email_password = value,
            "DEFAULT_FROM_EMAIL" => self.default_from_email = value,
            "CREATE_SUPERUSER" => self.create_superuser = parse_bool(key, &value)?,
            "SUPERUSER_NAME" => self.superuser_name = value,
            "SUPERUSER_EMAIL" => self.superuser_email = value,
            "SUPERUSER_PASSWORD" => self.superuser_password = value,
            other => return Err(format!("unknown key '{other}'")),
        }
        Ok(())
    }

    /// Parse configuration file content.
    ///
    /// The content is data, never code: each line must be a
    /// recognised `KEY=value` assignment. Keys absent from the
    /// content keep their [`Default`] value.
    pub fn parse(content: &str) -> DeployResult<Self> {
        let mut config = Self::default();
        let mut seen = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let lineno = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let invalid = |reason: String| DeployError::ConfigInvalid(format!("line {lineno}: {reason}"));

            let (key, raw) = trimmed
                .split_once('=')
                .ok_or_else(|| invalid("expected KEY=value".to_string()))?;
            let key = key.trim();

            if !KEYS.contains(&key) {
                return Err(invalid(format!("unknown key '{key}'")));
            }
            if seen.contains(&key) {
                return Err(invalid(format!("duplicate key '{key}'")));
            }
            seen.push(key);

            let value = parse_value(raw.trim()).map_err(&invalid)?;
            config.set(key, value).map_err(invalid)?;
        }

        Ok(config)
    }

    /// Serialize every recognised field.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("# djploy deployment configuration\n");
        for (key, value) in self.entries() {
            out.push_str(key);
            out.push('=');
            out.push_str(&quote(&value));
            out.push('\n');
        }
        out
    }

    /// Load the configuration saved at `path`, or `None` when no
    /// file exists.
    pub fn load(path: &Path) -> DeployResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map(Some)
    }

    /// Write the configuration to `path` with owner-only
    /// permissions. The file is replaced atomically: either every
    /// field is written or the previous file is left as it was.
    pub fn save(&self, path: &Path) -> DeployResult<()> {
        install::write_private(path, self.render().as_bytes())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" | "" => Ok(false),
        other => Err(format!("{key} expects true or false, got '{other}'")),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{key} expects a number, got '{value}'"))
}

/// Parse a bare or double-quoted value.
fn parse_value(raw: &str) -> Result<String, String> {
    let Some(inner) = raw.strip_prefix('"') else {
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || "._-:/@+,".contains(*c)))
        {
            return Err(format!("unquoted value contains '{bad}'"));
        }
        return Ok(raw.to_string());
    };

    let mut value = String::new();
    let mut chars = inner.chars();
    loop {
        match chars.next() {
            None => return Err("unterminated quoted value".to_string()),
            Some('"') => break,
            Some('\\') => match chars.next() {
                Some('\\') => value.push('\\'),
                Some('"') => value.push('"'),
                Some('n') => value.push('\n'),
                Some(other) => return Err(format!("unknown escape '\\{other}'")),
                None => return Err("unterminated quoted value".to_string()),
            },
            Some(c) => value.push(c),
        }
    }

    let rest: String = chars.collect();
    if rest.trim().is_empty() {
        Ok(value)
    } else {
        Err(format!("unexpected text after closing quote: '{}'", rest.trim()))
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// RFC 3986 unreserved characters pass through; everything else in
/// the userinfo part is escaped.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, USERINFO).to_string()
}

/// `[a-z][a-z0-9_]*`, safe for unit names, roles and databases.
#[must_use]
pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[must_use]
pub fn is_domain(value: &str) -> bool {
    value.contains('.')
        && value.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[must_use]
pub fn is_email(value: &str) -> bool {
    value
        .split_once('@')
        .is_some_and(|(local, host)| !local.is_empty() && is_domain(host))
}
