use std::path::Path;

use tracing::info;

use crate::error::DeployResult;
use crate::pipeline::{Step, StepContext};

/// Clone the application, or fast-forward an existing checkout.
///
/// Local modifications are never resolved here: a pull that cannot
/// fast-forward fails the step and leaves the tree for the operator.
pub struct Repository;

impl Step for Repository {
    fn name(&self) -> &'static str {
        "repository"
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()> {
        let c = ctx.config;
        let user = c.system_user.as_str();
        let dir = c.project_dir.as_str();
        let branch = c.repo_branch.as_str();

        if Path::new(dir).join(".git").exists() {
            info!("updating {dir} to {branch}");
            ctx.shell.run_as(user, "git", &["-C", dir, "fetch", "origin"])?;
            ctx.shell.run_as(user, "git", &["-C", dir, "checkout", branch])?;
            ctx.shell
                .run_as(user, "git", &["-C", dir, "pull", "--ff-only", "origin", branch])?;
        } else {
            info!("cloning {} ({branch}) into {dir}", c.repo_url);
            ctx.shell.run_as(
                user,
                "git",
                &["clone", "--branch", branch, &c.repo_url, dir],
            )?;
        }
        Ok(())
    }
}
