use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use tracing::info;

use crate::cmd::Shell;
use crate::config::DeploymentConfig;
use crate::error::DeployResult;
use crate::install::{self, Activation};
use crate::paths::HostPaths;

/// Extensions never served, whatever directory they sit in.
pub const DENIED_EXTENSIONS: &[&str] = &["env", "ini", "log", "sql", "bak", "sqlite3", "pyc", "sh", "conf"];

/// Configuration for the nginx site fronting one project.
///
/// # Example
///
/// ```
/// use djploy::{DeploymentConfig, HostPaths, NginxSite};
///
/// let mut config = DeploymentConfig::for_project("shop");
/// config.domain = "shop.example.com".into();
///
/// let site = NginxSite::from_config(&config, &HostPaths::new());
///
/// assert_eq!(site.server_name, "shop.example.com");
/// assert_eq!(site.socket, "/run/shop/shop.sock");
/// assert!(site.tls.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct NginxSite {
    pub project: String,
    pub server_name: String,
    pub socket: String,
    pub static_root: String,
    pub media_root: String,
    pub webroot: String,
    pub max_body_size: String,
    /// `(certificate, private key)` paths.
    pub tls: Option<(String, String)>,
}

impl NginxSite {
    #[must_use]
    pub fn from_config(config: &DeploymentConfig, paths: &HostPaths) -> Self {
        let server_name = if config.has_domain() {
            config.domain.clone()
        } else {
            "_".to_string()
        };
        Self {
            project: config.project_name.clone(),
            server_name,
            socket: config.socket_path(),
            static_root: config.static_root(),
            media_root: config.media_root(),
            webroot: paths.webroot.display().to_string(),
            max_body_size: "20M".to_string(),
            tls: None,
        }
    }

    /// Serve HTTPS from the letsencrypt live directory of `domain`.
    #[must_use]
    pub fn tls_from(mut self, live_dir: &Path) -> Self {
        self.tls = Some((
            live_dir.join("fullchain.pem").display().to_string(),
            live_dir.join("privkey.pem").display().to_string(),
        ));
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: &str) -> Self {
        self.max_body_size = size.to_string();
        self
    }

    #[must_use]
    pub fn upstream_name(&self) -> String {
        format!("{}_app", self.project)
    }

    /// Render the complete site file.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "# Generated by djploy for {project}; manual edits are overwritten.\n\
             upstream {upstream} {{\n    \
                 server unix:{socket} fail_timeout=0;\n\
             }}\n\n",
            project = self.project,
            upstream = self.upstream_name(),
            socket = self.socket,
        );

        match &self.tls {
            Some((cert, key)) => {
                out.push_str(&format!(
                    "server {{\n    \
                         listen 80;\n    \
                         listen [::]:80;\n    \
                         server_name {name};\n\n\
                     {acme}\n    \
                         location / {{\n        \
                             return 301 https://$host$request_uri;\n    \
                         }}\n\
                     }}\n\n\
                     server {{\n    \
                         listen 443 ssl;\n    \
                         listen [::]:443 ssl;\n    \
                         server_name {name};\n\n    \
                         ssl_certificate {cert};\n    \
                         ssl_certificate_key {key};\n    \
                         ssl_protocols TLSv1.2 TLSv1.3;\n\n",
                    name = self.server_name,
                    acme = self.acme_location(),
                ));
            }
            None => {
                out.push_str(&format!(
                    "server {{\n    \
                         listen 80;\n    \
                         listen [::]:80;\n    \
                         server_name {name};\n\n",
                    name = self.server_name,
                ));
            }
        }

        out.push_str(&self.app_locations());
        out.push_str("}\n");
        out
    }

    fn acme_location(&self) -> String {
        format!(
            "    location ^~ /.well-known/acme-challenge/ {{\n        \
                 root {webroot};\n    \
             }}\n",
            webroot = self.webroot
        )
    }

    fn app_locations(&self) -> String {
        format!(
            "    client_max_body_size {size};\n\n\
             {acme}\n    \
             location ~ /\\. {{\n        \
                 deny all;\n    \
             }}\n\n    \
             location ~* \\.({extensions})$ {{\n        \
                 deny all;\n    \
             }}\n\n    \
             location /static/ {{\n        \
                 alias {static_root}/;\n        \
                 access_log off;\n        \
                 expires 30d;\n    \
             }}\n\n    \
             location /media/ {{\n        \
                 alias {media_root}/;\n    \
             }}\n\n    \
             location / {{\n        \
                 proxy_set_header Host $host;\n        \
                 proxy_set_header X-Real-IP $remote_addr;\n        \
                 proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n        \
                 proxy_set_header X-Forwarded-Proto $scheme;\n        \
                 proxy_redirect off;\n        \
                 proxy_pass http://{upstream};\n    \
             }}\n",
            size = self.max_body_size,
            acme = self.acme_location(),
            extensions = DENIED_EXTENSIONS.join("|"),
            static_root = self.static_root,
            media_root = self.media_root,
            upstream = self.upstream_name(),
        )
    }
}

/// Render the site for `config`, with TLS when a certificate for
/// its domain is present in the letsencrypt live directory.
#[must_use]
pub fn render_for(config: &DeploymentConfig, paths: &HostPaths) -> String {
    let site = NginxSite::from_config(config, paths);
    let live = paths.cert_dir(&config.domain);
    let site = if config.wants_ssl() && live.join("fullchain.pem").exists() {
        site.tls_from(&live)
    } else {
        site
    };
    site.render()
}

/// Syntax-check the running configuration.
pub fn test_config(shell: &dyn Shell) -> DeployResult<()> {
    shell.run("nginx", &["-t"]).map(|_| ())
}

/// Validate, then reload the running proxy.
pub fn reload(shell: &dyn Shell) -> DeployResult<()> {
    test_config(shell)?;
    shell.run("systemctl", &["reload", "nginx"])?;
    info!("nginx reloaded");
    Ok(())
}

/// Install the site, enable it, validate with `nginx -t` and reload.
///
/// A failed validation leaves the previous site file and link as
/// they were, and nginx is not reloaded.
pub fn install_site(
    shell: &dyn Shell,
    paths: &HostPaths,
    project: &str,
    content: &str,
) -> DeployResult<Activation> {
    let site = paths.nginx_site(project);
    let link = paths.nginx_link(project);

    let activation = install::install_validated(&site, content, || {
        let created = ensure_link(&site, &link)?;
        let result = test_config(shell);
        if result.is_err() && created {
            fs::remove_file(&link)?;
        }
        result
    })?;

    let relinked = activation == Activation::Unchanged && ensure_link(&site, &link)?;
    if activation == Activation::Changed || relinked {
        reload(shell)?;
        return Ok(Activation::Changed);
    }
    Ok(activation)
}

/// Remove the site and its link, then reload.
pub fn remove_site(shell: &dyn Shell, paths: &HostPaths, project: &str) -> DeployResult<()> {
    for path in [paths.nginx_link(project), paths.nginx_site(project)] {
        if path.symlink_metadata().is_ok() {
            fs::remove_file(&path)?;
            info!("removed {}", path.display());
        }
    }
    reload(shell)
}

/// Create the sites-enabled link. Returns whether it was created.
fn ensure_link(site: &Path, link: &Path) -> DeployResult<bool> {
    if link.symlink_metadata().is_ok() {
        return Ok(false);
    }
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    symlink(site, link)?;
    Ok(true)
}
