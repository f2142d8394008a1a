use tracing::info;

use crate::error::DeployResult;
use crate::pipeline::{Step, StepContext};

/// The service account owning the project directory.
pub struct SystemUser;

impl Step for SystemUser {
    fn name(&self) -> &'static str {
        "system-user"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let user = ctx.config.system_user.as_str();
        let dir = ctx.config.project_dir.as_str();
        let shell = ctx.shell;

        if shell.run("id", &["-u", user]).is_err() {
            info!("creating system user {user}");
            match shell.run("useradd", &["--create-home", "--shell", "/bin/bash", user]) {
                Err(e) if !e.is_already_exists() => return Err(e),
                _ => {}
            }
        }

        // nginx reads public/ through the account's group.
        shell.run("usermod", &["-a", "-G", user, "www-data"])?;

        shell.run("mkdir", &["-p", dir])?;
        let owner = format!("{user}:{user}");
        shell.run("chown", &[&owner, dir])?;
        shell.run("chmod", &["750", dir])?;
        Ok(())
    }
}
