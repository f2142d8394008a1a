use tracing::{error, info};

use crate::cmd::Shell;
use crate::error::{DeployError, DeployResult};

/// Executables every run needs: interpreter, fetcher, version
/// control, database client, reverse proxy, service manager.
pub const REQUIRED_TOOLS: &[&str] = &["python3", "curl", "git", "psql", "nginx", "systemctl"];

/// Oldest interpreter the pipeline supports.
pub const MIN_PYTHON: (u32, u32) = (3, 8);

/// Outcome of a preflight run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub missing: Vec<String>,
    pub python_version: Option<(u32, u32, u32)>,
    pub version_problem: Option<String>,
}

impl PreflightReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.version_problem.is_none()
    }

    /// Every remediation item, missing tools first.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems: Vec<String> = self
            .missing
            .iter()
            .map(|tool| format!("'{tool}' not found on PATH"))
            .collect();
        problems.extend(self.version_problem.clone());
        problems
    }

    /// Convert a failed report into an environment error.
    pub fn into_result(self) -> DeployResult<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(DeployError::PreflightFailed {
                problems: self.problems(),
            })
        }
    }
}

/// Check every required tool without stopping at the first miss,
/// then the interpreter version.
pub fn check(shell: &dyn Shell, tools: &[&str]) -> PreflightReport {
    info!("Checking prerequisites...");

    let missing: Vec<String> = tools
        .iter()
        .filter(|tool| !shell.command_exists(tool))
        .map(|tool| (*tool).to_string())
        .collect();

    let mut report = PreflightReport {
        missing,
        ..PreflightReport::default()
    };

    if !report.missing.iter().any(|t| t == "python3") {
        match shell.run("python3", &["--version"]) {
            Ok(output) => match parse_python_version(&output) {
                Some(version) => {
                    report.python_version = Some(version);
                    if !version_satisfies(version, MIN_PYTHON) {
                        report.version_problem = Some(format!(
                            "python3 {}.{}.{} is older than {}.{}",
                            version.0, version.1, version.2, MIN_PYTHON.0, MIN_PYTHON.1
                        ));
                    }
                }
                None => {
                    report.version_problem =
                        Some(format!("could not parse python3 version from '{output}'"));
                }
            },
            Err(e) => report.version_problem = Some(format!("python3 --version failed: {e}")),
        }
    }

    if report.passed() {
        info!("Prerequisites OK");
    } else {
        for problem in report.problems() {
            error!("{problem}");
        }
    }
    report
}

/// Parse `Python X.Y.Z` as printed by `python3 --version`.
#[must_use]
pub fn parse_python_version(output: &str) -> Option<(u32, u32, u32)> {
    let version = output.trim().strip_prefix("Python ")?;
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts
        .next()
        .map_or(Some(0), |p| {
            p.chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .ok()
        })?;
    Some((major, minor, patch))
}

#[must_use]
pub fn version_satisfies(version: (u32, u32, u32), minimum: (u32, u32)) -> bool {
    (version.0, version.1) >= minimum
}
