pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("command failed: {command}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("preflight failed: {}", .problems.join(", "))]
    PreflightFailed { problems: Vec<String> },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("no saved configuration at {0}")]
    ConfigMissing(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("validation failed for {path}: {reason}")]
    ValidationFailed { path: String, reason: String },

    #[error("step '{step}' failed after {} completed step(s): {source}", .completed.len())]
    StepFailed {
        step: String,
        completed: Vec<String>,
        #[source]
        source: Box<DeployError>,
    },

    #[error("certificate error for {domain}: {reason}")]
    Certificate { domain: String, reason: String },

    #[error("certificate renewal failed for {failed} of {total} domain(s)")]
    RenewalFailed { failed: usize, total: usize },

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Prompt(#[from] dialoguer::Error),
}

impl DeployError {
    /// Whether a failed command reported a duplicate-creation
    /// condition ("already exists"). Provisioning steps treat
    /// these as success.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => stderr.contains("already exists"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_is_detected_from_stderr() {
        let err = DeployError::CommandFailed {
            command: "useradd shop".into(),
            code: Some(9),
            stderr: "useradd: user 'shop' already exists".into(),
        };
        assert!(err.is_already_exists());
    }

    #[test]
    fn other_failures_are_not_tolerated() {
        let err = DeployError::CommandFailed {
            command: "createdb shop".into(),
            code: Some(1),
            stderr: "permission denied".into(),
        };
        assert!(!err.is_already_exists());
        assert!(!DeployError::Other("already exists".into()).is_already_exists());
    }
}
