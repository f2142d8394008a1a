use std::path::Path;

use tracing::info;

use crate::config::DeploymentConfig;
use crate::error::DeployResult;
use crate::pipeline::{Step, StepContext};

/// Packages installed when the project has no `requirements.txt`.
pub const FALLBACK_PACKAGES: &[&str] = &["django", "gunicorn", "psycopg2-binary"];

/// Create the virtual environment and install dependencies.
pub struct Virtualenv;

/// What pip should install for this project.
#[must_use]
pub fn packages(config: &DeploymentConfig, has_requirements: bool) -> Vec<&'static str> {
    let mut packages = if has_requirements {
        // The unit needs gunicorn even if requirements.txt omits it.
        vec!["gunicorn"]
    } else {
        FALLBACK_PACKAGES.to_vec()
    };
    if config.use_celery {
        packages.extend(["celery", "redis"]);
    }
    packages
}

impl Step for Virtualenv {
    fn name(&self) -> &'static str {
        "virtualenv"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let c = ctx.config;
        let user = c.system_user.as_str();
        let venv = c.venv_dir();
        let pip = c.venv_bin("pip");

        if Path::new(&c.venv_bin("python")).exists() {
            info!("virtualenv {venv} exists");
        } else {
            info!("creating virtualenv {venv}");
            ctx.shell.run_as(user, "python3", &["-m", "venv", &venv])?;
        }

        ctx.shell
            .run_as(user, &pip, &["install", "--quiet", "--upgrade", "pip"])?;

        let requirements = Path::new(&c.project_dir).join("requirements.txt");
        let has_requirements = requirements.exists();
        if has_requirements {
            let requirements = requirements.display().to_string();
            info!("installing {requirements}");
            ctx.shell
                .run_as(user, &pip, &["install", "--quiet", "-r", &requirements])?;
        }

        let mut args = vec!["install", "--quiet"];
        args.extend(packages(c, has_requirements));
        ctx.shell.run_as(user, &pip, &args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_without_requirements() {
        let config = DeploymentConfig::for_project("shop");

        assert_eq!(packages(&config, false), vec!["django", "gunicorn", "psycopg2-binary"]);
    }

    #[test]
    fn celery_adds_broker_client() {
        let mut config = DeploymentConfig::for_project("shop");
        config.use_celery = true;

        assert_eq!(packages(&config, true), vec!["gunicorn", "celery", "redis"]);
    }
}
