use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::cmd::Shell;
use crate::config::DeploymentConfig;
use crate::error::{DeployError, DeployResult};
use crate::paths::HostPaths;

/// Everything a step may read. The configuration is validated
/// before the pipeline starts and never changes during a run.
pub struct StepContext<'a> {
    pub config: &'a DeploymentConfig,
    pub shell: &'a dyn Shell,
    pub paths: &'a HostPaths,
}

impl<'a> StepContext<'a> {
    #[must_use]
    pub fn new(config: &'a DeploymentConfig, shell: &'a dyn Shell, paths: &'a HostPaths) -> Self {
        Self {
            config,
            shell,
            paths,
        }
    }
}

/// One idempotent unit of host mutation.
pub trait Step {
    /// Short kebab-case name shown in progress and errors.
    fn name(&self) -> &'static str;

    /// Whether the host is already in the state `apply` produces.
    /// Steps that are cheap and safe to repeat keep the default.
    fn is_applied(&self, _ctx: &StepContext<'_>) -> DeployResult<bool> {
        Ok(false)
    }

    fn apply(&self, ctx: &StepContext<'_>) -> DeployResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    AlreadyApplied,
}

/// What a successful run did, in step order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub outcomes: Vec<(String, StepOutcome)>,
}

impl PipelineReport {
    /// Names of every step that finished, applied or skipped.
    #[must_use]
    pub fn completed(&self) -> Vec<String> {
        self.outcomes.iter().map(|(name, _)| name.clone()).collect()
    }

    #[must_use]
    pub fn applied(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == StepOutcome::Applied)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Runs steps in order and stops at the first failure.
///
/// A failure is returned as [`DeployError::StepFailed`] carrying
/// the names of the steps that completed before it, so the operator
/// knows how far the host got.
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
    progress: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            progress: true,
        }
    }

    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add `step` only when `enabled`.
    #[must_use]
    pub fn step_if(self, enabled: bool, step: impl Step + 'static) -> Self {
        if enabled { self.step(step) } else { self }
    }

    /// Hide the progress bar.
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.progress = false;
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, ctx: &StepContext<'_>) -> DeployResult<PipelineReport> {
        let bar = self.progress_bar();
        let mut report = PipelineReport::default();

        for step in &self.steps {
            let name = step.name();
            bar.set_message(name);

            let outcome = match run_step(step.as_ref(), ctx) {
                Ok(outcome) => outcome,
                Err(source) => {
                    bar.abandon_with_message(format!("{name} failed"));
                    error!("step {name} failed: {source}");
                    return Err(DeployError::StepFailed {
                        step: name.to_string(),
                        completed: report.completed(),
                        source: Box::new(source),
                    });
                }
            };

            report.outcomes.push((name.to_string(), outcome));
            bar.inc(1);
        }

        bar.finish_with_message("done");
        Ok(report)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(self.steps.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("[{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("=> ")),
        );
        bar
    }
}

fn run_step(step: &dyn Step, ctx: &StepContext<'_>) -> DeployResult<StepOutcome> {
    if step.is_applied(ctx)? {
        info!("{}: already applied", step.name());
        return Ok(StepOutcome::AlreadyApplied);
    }
    info!("{}: applying", step.name());
    step.apply(ctx)?;
    Ok(StepOutcome::Applied)
}
