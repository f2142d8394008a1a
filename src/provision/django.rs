use tracing::info;

use crate::cmd::sudo_args;
use crate::config::DeploymentConfig;
use crate::error::DeployResult;
use crate::pipeline::{Step, StepContext};

/// `manage.py migrate`.
pub struct Migrate;

/// `manage.py collectstatic` into `public/static`.
pub struct CollectStatic;

/// Create the Django superuser unless the username is taken.
pub struct CreateSuperuser;

fn manage(ctx: &StepContext<'_>, args: &[&str]) -> DeployResult<String> {
    let c = ctx.config;
    let manage_py = c.manage_py();
    let mut full = vec![manage_py.as_str()];
    full.extend_from_slice(args);
    ctx.shell.run_as(&c.system_user, &c.venv_bin("python"), &full)
}

impl Step for Migrate {
    fn name(&self) -> &'static str {
        "migrations"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        manage(ctx, &["migrate", "--noinput"])?;
        Ok(())
    }
}

impl Step for CollectStatic {
    fn name(&self) -> &'static str {
        "static-files"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let c = ctx.config;
        let static_root = c.static_root();
        let media_root = c.media_root();
        ctx.shell
            .run_as(&c.system_user, "mkdir", &["-p", &static_root, &media_root])?;
        manage(ctx, &["collectstatic", "--noinput"])?;
        Ok(())
    }
}

impl Step for CreateSuperuser {
    fn name(&self) -> &'static str {
        "superuser"
    }

    fn is_applied(&self, ctx: &StepContext<'_>) -> DeployResult<bool> {
        let c = ctx.config;
        if !c.create_superuser {
            return Ok(true);
        }
        let output = manage(ctx, &["shell", "-c", &exists_script(&c.superuser_name)?])?;
        Ok(output.trim().ends_with("yes"))
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let c = ctx.config;
        let python = c.venv_bin("python");
        let manage_py = c.manage_py();
        let args = sudo_args(&c.system_user, &python, &[&manage_py, "shell"]);
        // The password travels on stdin, never in argv.
        ctx.shell
            .run_with_stdin("sudo", &args, create_script(c)?.as_bytes())?;
        info!("superuser {} created", c.superuser_name);
        Ok(())
    }
}

/// Python printing `yes` when `username` exists.
pub fn exists_script(username: &str) -> DeployResult<String> {
    Ok(format!(
        "from django.contrib.auth import get_user_model; \
         print('yes' if get_user_model().objects.filter(username={}).exists() else 'no')",
        serde_json::to_string(username)?
    ))
}

/// Python creating the configured superuser. Values are embedded as
/// JSON string literals, which Python reads verbatim.
pub fn create_script(config: &DeploymentConfig) -> DeployResult<String> {
    Ok(format!(
        "from django.contrib.auth import get_user_model\n\
         User = get_user_model()\n\
         if not User.objects.filter(username={name}).exists():\n    \
             User.objects.create_superuser({name}, {email}, {password})\n",
        name = serde_json::to_string(&config.superuser_name)?,
        email = serde_json::to_string(&config.superuser_email)?,
        password = serde_json::to_string(&config.superuser_password)?,
    ))
}
