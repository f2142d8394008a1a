use chrono::Utc;
use tracing::info;

use crate::certs;
use crate::error::DeployResult;
use crate::nginx;
use crate::pipeline::{Step, StepContext};
use crate::systemd;

/// Gunicorn and Celery units.
pub struct ServiceUnits;

/// The nginx site, plain HTTP until a certificate exists.
pub struct NginxSiteStep;

/// Certificate for the configured domain, then the TLS site.
pub struct Certificates;

/// Restart every unit and reload nginx.
pub struct RestartServices;

impl Step for ServiceUnits {
    fn name(&self) -> &'static str {
        "services"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        systemd::install_units(ctx.shell, ctx.paths, ctx.config)
    }
}

impl Step for NginxSiteStep {
    fn name(&self) -> &'static str {
        "nginx-site"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let content = nginx::render_for(ctx.config, ctx.paths);
        nginx::install_site(ctx.shell, ctx.paths, &ctx.config.project_name, &content)?;
        Ok(())
    }
}

impl Step for Certificates {
    fn name(&self) -> &'static str {
        "certificates"
    }

    fn is_applied(&self, ctx: &StepContext<'_>) -> DeployResult<bool> {
        Ok(!ctx.config.wants_ssl())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        if certs::ensure_certificate(ctx.shell, ctx.paths, ctx.config, Utc::now())?.is_some() {
            let content = nginx::render_for(ctx.config, ctx.paths);
            nginx::install_site(ctx.shell, ctx.paths, &ctx.config.project_name, &content)?;
            info!("https://{} is live", ctx.config.domain);
        }
        Ok(())
    }
}

impl Step for RestartServices {
    fn name(&self) -> &'static str {
        "restart-services"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        systemd::restart_all(ctx.shell, ctx.config)?;
        nginx::reload(ctx.shell)
    }
}
