use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{error, info, warn};

use crate::cmd::Shell;
use crate::config::DeploymentConfig;
use crate::error::{DeployError, DeployResult};
use crate::install;
use crate::nginx;
use crate::paths::HostPaths;

/// Renew when a certificate has this many days left or fewer.
pub const RENEWAL_THRESHOLD_DAYS: i64 = 30;

/// Renewal log records older than this are pruned after each run.
pub const LOG_RETENTION_DAYS: i64 = 30;

const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A domain this host is responsible for renewing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCertEntry {
    pub domain: String,
    pub email: String,
    pub webroot: PathBuf,
}

impl DomainCertEntry {
    #[must_use]
    pub fn new(domain: &str, email: &str, webroot: &Path) -> Self {
        Self {
            domain: domain.to_string(),
            email: email.to_string(),
            webroot: webroot.to_path_buf(),
        }
    }

    fn to_line(&self) -> String {
        format!("{},{},{}", self.domain, self.email, self.webroot.display())
    }
}

/// What happened to one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertAction {
    Issued,
    Renewed { days_left: i64 },
    Skipped { days_left: i64 },
}

impl fmt::Display for CertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issued => f.write_str("certificate issued"),
            Self::Renewed { days_left } => write!(f, "renewed ({days_left} days were left)"),
            Self::Skipped { days_left } => write!(f, "valid for {days_left} more days, skipped"),
        }
    }
}

/// Per-domain outcomes of one renewal run.
#[derive(Debug, Default)]
pub struct RenewalReport {
    pub outcomes: Vec<(String, Result<CertAction, String>)>,
}

impl RenewalReport {
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_err()).count()
    }

    #[must_use]
    pub fn failed_domains(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(d, _)| d.as_str())
            .collect()
    }
}

/// Parse the domain registry: `domain,email,webroot` per line.
///
/// `#` comments and blank lines are ignored. Malformed lines are
/// returned separately so the caller can report them.
#[must_use]
pub fn parse_registry(content: &str) -> (Vec<DomainCertEntry>, Vec<String>) {
    let mut entries = Vec::new();
    let mut problems = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        match fields.as_slice() {
            [domain, email, webroot] if !domain.is_empty() && !webroot.is_empty() => {
                entries.push(DomainCertEntry::new(domain, email, Path::new(webroot)));
            }
            _ => problems.push(format!(
                "line {}: expected domain,email,webroot",
                index + 1
            )),
        }
    }

    (entries, problems)
}

/// Add `entry` to the registry unless its domain is already listed.
pub fn register_domain(path: &Path, entry: &DomainCertEntry) -> DeployResult<bool> {
    let content = fs::read_to_string(path).unwrap_or_default();
    let (entries, _) = parse_registry(&content);
    if entries.iter().any(|e| e.domain == entry.domain) {
        return Ok(false);
    }

    let mut updated = content;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    if updated.is_empty() {
        updated.push_str("# domain,email,webroot\n");
    }
    updated.push_str(&entry.to_line());
    updated.push('\n');
    install::write_atomic(path, updated.as_bytes())?;
    info!("registered {} for renewal", entry.domain);
    Ok(true)
}

/// Extract the expiry instant from `certbot certificates` output.
///
/// Returns `None` when certbot reports no certificate.
#[must_use]
pub fn parse_expiry(output: &str) -> Option<DateTime<Utc>> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Expiry Date:")?.trim();
        let stamp = rest.split(" (").next()?.trim();
        DateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S%:z")
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[must_use]
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_days()
}

#[must_use]
pub const fn needs_renewal(days_left: i64) -> bool {
    days_left <= RENEWAL_THRESHOLD_DAYS
}

/// Expiry of the current certificate for `domain`, if any.
pub fn current_expiry(shell: &dyn Shell, domain: &str) -> DeployResult<Option<DateTime<Utc>>> {
    let output = shell.run("certbot", &["certificates", "--cert-name", domain])?;
    Ok(parse_expiry(&output))
}

fn request(shell: &dyn Shell, entry: &DomainCertEntry, force: bool) -> DeployResult<()> {
    let webroot = entry.webroot.display().to_string();
    let mut args = vec![
        "certonly",
        "--webroot",
        "-w",
        webroot.as_str(),
        "-d",
        entry.domain.as_str(),
        "--email",
        entry.email.as_str(),
        "--agree-tos",
        "--non-interactive",
    ];
    if force {
        args.push("--force-renewal");
    }
    shell.run("certbot", &args).map(|_| ())
}

/// Issue or renew the certificate of one domain, reloading nginx
/// after any change.
pub fn process_domain(
    shell: &dyn Shell,
    entry: &DomainCertEntry,
    now: DateTime<Utc>,
) -> DeployResult<CertAction> {
    if !entry.webroot.is_dir() {
        return Err(DeployError::Certificate {
            domain: entry.domain.clone(),
            reason: format!("webroot {} is not a directory", entry.webroot.display()),
        });
    }

    let action = match current_expiry(shell, &entry.domain)? {
        None => {
            info!("{}: no certificate, requesting one", entry.domain);
            request(shell, entry, false)?;
            CertAction::Issued
        }
        Some(expiry) => {
            let days_left = days_until(expiry, now);
            if !needs_renewal(days_left) {
                return Ok(CertAction::Skipped { days_left });
            }
            info!("{}: {days_left} days left, renewing", entry.domain);
            request(shell, entry, true)?;
            CertAction::Renewed { days_left }
        }
    };

    nginx::reload(shell)?;
    Ok(action)
}

/// Process every entry. A failure is recorded against its domain
/// and the batch continues.
pub fn renew_batch(
    shell: &dyn Shell,
    entries: &[DomainCertEntry],
    log: &RenewalLog,
    now: DateTime<Utc>,
) -> RenewalReport {
    let mut report = RenewalReport::default();

    for entry in entries {
        let outcome = process_domain(shell, entry, now).map_err(|e| e.to_string());
        match &outcome {
            Ok(action) => {
                info!("{}: {action}", entry.domain);
                log.append(now, "INFO", &format!("{}: {action}", entry.domain));
            }
            Err(reason) => {
                error!("{}: {reason}", entry.domain);
                log.append(now, "ERROR", &format!("{}: {reason}", entry.domain));
            }
        }
        report.outcomes.push((entry.domain.clone(), outcome));
    }

    report
}

/// Send one message summarising every failed domain.
pub fn notify_failures(shell: &dyn Shell, report: &RenewalReport, to: &str) -> DeployResult<()> {
    let failed = report.failed_domains();
    let subject = format!("Certificate renewal failed for {} domain(s)", failed.len());
    let mut body = String::new();
    for (domain, outcome) in &report.outcomes {
        if let Err(reason) = outcome {
            body.push_str(&format!("{domain}: {reason}\n"));
        }
    }

    if !shell.command_exists("mail") {
        warn!("'mail' not installed, cannot notify {to}: {subject}");
        return Ok(());
    }
    shell.run_with_stdin("mail", &["-s", &subject, to], body.as_bytes())?;
    info!("failure notification sent to {to}");
    Ok(())
}

/// Run the renewal helper against the domain registry.
///
/// The renewal log is pruned whatever the outcome. Any failed
/// domain turns the run into a [`DeployError::RenewalFailed`].
pub fn run_renewal(
    shell: &dyn Shell,
    paths: &HostPaths,
    notify_email: Option<&str>,
    now: DateTime<Utc>,
) -> DeployResult<RenewalReport> {
    let log = RenewalLog::new(&paths.renewal_log());
    let result = renew_registry(shell, paths, notify_email, &log, now);

    if let Err(e) = log.prune(now, LOG_RETENTION_DAYS) {
        warn!("could not prune {}: {e}", log.path.display());
    }
    result
}

fn renew_registry(
    shell: &dyn Shell,
    paths: &HostPaths,
    notify_email: Option<&str>,
    log: &RenewalLog,
    now: DateTime<Utc>,
) -> DeployResult<RenewalReport> {
    let registry = &paths.domain_registry;
    let content = fs::read_to_string(registry)
        .map_err(|_| DeployError::FileNotFound(registry.display().to_string()))?;
    let (entries, problems) = parse_registry(&content);
    for problem in &problems {
        warn!("{}: {problem}", registry.display());
    }

    if entries.is_empty() {
        info!("no domains registered for renewal");
        return Ok(RenewalReport::default());
    }

    log.append(now, "INFO", &format!("renewal run for {} domain(s)", entries.len()));
    let report = renew_batch(shell, &entries, log, now);

    let failed = report.error_count();
    if failed == 0 {
        return Ok(report);
    }

    let to = notify_email.or_else(|| {
        entries
            .iter()
            .find(|e| report.failed_domains().contains(&e.domain.as_str()))
            .map(|e| e.email.as_str())
    });
    if let Some(to) = to {
        if let Err(e) = notify_failures(shell, &report, to) {
            warn!("failure notification not sent: {e}");
        }
    }

    Err(DeployError::RenewalFailed {
        failed,
        total: report.outcomes.len(),
    })
}

/// Obtain or renew the certificate for the configured domain as
/// part of a deployment. A no-op when no domain is set or SSL is
/// disabled.
pub fn ensure_certificate(
    shell: &dyn Shell,
    paths: &HostPaths,
    config: &DeploymentConfig,
    now: DateTime<Utc>,
) -> DeployResult<Option<CertAction>> {
    if !config.wants_ssl() {
        info!("no domain with SSL configured, skipping certificates");
        return Ok(None);
    }

    fs::create_dir_all(&paths.webroot)?;
    let entry = DomainCertEntry::new(&config.domain, &config.ssl_email, &paths.webroot);
    register_domain(&paths.domain_registry, &entry)?;

    let action = process_domain(shell, &entry, now)?;
    info!("{}: {action}", entry.domain);
    Ok(Some(action))
}

/// Days left on the configured domain's certificate, for monitoring.
pub fn days_left(
    shell: &dyn Shell,
    domain: &str,
    now: DateTime<Utc>,
) -> DeployResult<Option<i64>> {
    Ok(current_expiry(shell, domain)?.map(|expiry| days_until(expiry, now)))
}

/// Timestamped append-only log of renewal runs.
pub struct RenewalLog {
    path: PathBuf,
}

impl RenewalLog {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Append one record. Logging failures never abort a run.
    pub fn append(&self, now: DateTime<Utc>, level: &str, message: &str) {
        let line = format!("{} [{level}] {message}\n", now.format(LOG_TIME_FORMAT));
        let written = self
            .path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
            })
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = written {
            warn!("cannot write {}: {e}", self.path.display());
        }
    }

    /// Drop records older than `days`. Lines without a timestamp
    /// are kept. Returns the number of records removed.
    pub fn prune(&self, now: DateTime<Utc>, days: i64) -> DeployResult<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let cutoff = (now - Duration::days(days)).naive_utc();
        let content = fs::read_to_string(&self.path)?;

        let mut removed = 0;
        let mut kept = String::with_capacity(content.len());
        for line in content.lines() {
            let stamp = line
                .get(..19)
                .and_then(|s| NaiveDateTime::parse_from_str(s, LOG_TIME_FORMAT).ok());
            if stamp.is_some_and(|t| t < cutoff) {
                removed += 1;
                continue;
            }
            kept.push_str(line);
            kept.push('\n');
        }

        if removed > 0 {
            install::write_atomic(&self.path, kept.as_bytes())?;
        }
        Ok(removed)
    }
}
