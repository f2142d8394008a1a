use std::path::{Path, PathBuf};

/// Host locations the wizard reads and writes.
///
/// Defaults follow the Debian/Ubuntu layout. Each location can be
/// overridden, which is how tests run the full pipeline inside a
/// temporary directory.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub config_file: PathBuf,
    pub systemd_dir: PathBuf,
    pub nginx_available: PathBuf,
    pub nginx_enabled: PathBuf,
    pub backup_root: PathBuf,
    pub webroot: PathBuf,
    pub domain_registry: PathBuf,
    pub log_dir: PathBuf,
    pub letsencrypt_live: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("/etc/djploy/deploy.conf"),
            systemd_dir: PathBuf::from("/etc/systemd/system"),
            nginx_available: PathBuf::from("/etc/nginx/sites-available"),
            nginx_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            backup_root: PathBuf::from("/var/backups/djploy"),
            webroot: PathBuf::from("/var/www/letsencrypt"),
            domain_registry: PathBuf::from("/etc/djploy/domains.conf"),
            log_dir: PathBuf::from("/var/log/djploy"),
            letsencrypt_live: PathBuf::from("/etc/letsencrypt/live"),
        }
    }
}

impl HostPaths {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every location rooted under `root`, for sandboxed runs.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        let base = Self::default();
        let rebase = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
        Self {
            config_file: rebase(&base.config_file),
            systemd_dir: rebase(&base.systemd_dir),
            nginx_available: rebase(&base.nginx_available),
            nginx_enabled: rebase(&base.nginx_enabled),
            backup_root: rebase(&base.backup_root),
            webroot: rebase(&base.webroot),
            domain_registry: rebase(&base.domain_registry),
            log_dir: rebase(&base.log_dir),
            letsencrypt_live: rebase(&base.letsencrypt_live),
        }
    }

    #[must_use]
    pub fn config_file(mut self, path: &Path) -> Self {
        self.config_file = path.to_path_buf();
        self
    }

    #[must_use]
    pub fn domain_registry(mut self, path: &Path) -> Self {
        self.domain_registry = path.to_path_buf();
        self
    }

    #[must_use]
    pub fn nginx_site(&self, project: &str) -> PathBuf {
        self.nginx_available.join(project)
    }

    #[must_use]
    pub fn nginx_link(&self, project: &str) -> PathBuf {
        self.nginx_enabled.join(project)
    }

    #[must_use]
    pub fn unit_file(&self, unit: &str) -> PathBuf {
        self.systemd_dir.join(unit)
    }

    #[must_use]
    pub fn renewal_log(&self) -> PathBuf {
        self.log_dir.join("ssl-renewal.log")
    }

    #[must_use]
    pub fn cert_dir(&self, domain: &str) -> PathBuf {
        self.letsencrypt_live.join(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_rebases_every_path() {
        let paths = HostPaths::under(Path::new("/tmp/sandbox"));

        assert_eq!(
            paths.nginx_site("shop"),
            PathBuf::from("/tmp/sandbox/etc/nginx/sites-available/shop")
        );
        assert_eq!(
            paths.unit_file("shop.service"),
            PathBuf::from("/tmp/sandbox/etc/systemd/system/shop.service")
        );
        assert_eq!(
            paths.renewal_log(),
            PathBuf::from("/tmp/sandbox/var/log/djploy/ssl-renewal.log")
        );
    }

    #[test]
    fn overrides_replace_defaults() {
        let paths = HostPaths::new()
            .config_file(Path::new("/srv/shop.conf"))
            .domain_registry(Path::new("/srv/domains.conf"));

        assert_eq!(paths.config_file, PathBuf::from("/srv/shop.conf"));
        assert_eq!(paths.domain_registry, PathBuf::from("/srv/domains.conf"));
        assert_eq!(paths.systemd_dir, PathBuf::from("/etc/systemd/system"));
    }
}
