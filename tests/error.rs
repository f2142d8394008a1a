use djploy::error::DeployError;

#[test]
fn display_command_not_found() {
    let err = DeployError::CommandNotFound("certbot".into());
    assert_eq!(err.to_string(), "command not found: certbot");
}

#[test]
fn display_command_failed() {
    let err = DeployError::CommandFailed {
        command: "nginx -t".into(),
        code: Some(1),
        stderr: "emerg".into(),
    };
    assert_eq!(err.to_string(), "command failed: nginx -t");
}

#[test]
fn display_preflight_failed() {
    let err = DeployError::PreflightFailed {
        problems: vec!["'git' not found on PATH".into(), "'psql' not found on PATH".into()],
    };
    assert_eq!(
        err.to_string(),
        "preflight failed: 'git' not found on PATH, 'psql' not found on PATH"
    );
}

#[test]
fn display_config_missing() {
    let err = DeployError::ConfigMissing("/etc/djploy/deploy.conf".into());
    assert_eq!(err.to_string(), "no saved configuration at /etc/djploy/deploy.conf");
}

#[test]
fn display_step_failed() {
    let err = DeployError::StepFailed {
        step: "migrations".into(),
        completed: vec!["system-user".into(), "repository".into()],
        source: Box::new(DeployError::Other("boom".into())),
    };
    assert_eq!(
        err.to_string(),
        "step 'migrations' failed after 2 completed step(s): boom"
    );
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn display_renewal_failed() {
    let err = DeployError::RenewalFailed { failed: 1, total: 3 };
    assert_eq!(err.to_string(), "certificate renewal failed for 1 of 3 domain(s)");
}

#[test]
fn display_file_not_found() {
    let err = DeployError::FileNotFound("domains.conf".into());
    assert_eq!(err.to_string(), "file not found: domains.conf");
}

#[test]
fn display_other() {
    let err = DeployError::Other("custom error".into());
    assert_eq!(err.to_string(), "custom error");
}

#[test]
fn already_exists_is_detected() {
    let err = DeployError::CommandFailed {
        command: "psql".into(),
        code: Some(1),
        stderr: "ERROR:  role \"shop_user\" already exists".into(),
    };
    assert!(err.is_already_exists());
    assert!(!DeployError::Other("already exists".into()).is_already_exists());
}

#[test]
fn from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err: DeployError = io_err.into();
    assert!(matches!(err, DeployError::Io(_)));
}

#[test]
fn from_json_error() {
    let json_err = serde_json::from_str::<Vec<u64>>("invalid").unwrap_err();
    let err: DeployError = json_err.into();
    assert!(matches!(err, DeployError::Json(_)));
}
