use std::fmt;

use console::style;
use tracing::error;

use crate::error::{DeployError, DeployResult};
use crate::wizard::Wizard;

/// Top-level actions, in menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    FullDeploy,
    ConfigureOnly,
    Update,
    Backup,
    Restore,
    Monitor,
    ViewLogs,
    RestartServices,
    Uninstall,
    Exit,
}

impl MenuAction {
    pub const ALL: [Self; 10] = [
        Self::FullDeploy,
        Self::ConfigureOnly,
        Self::Update,
        Self::Backup,
        Self::Restore,
        Self::Monitor,
        Self::ViewLogs,
        Self::RestartServices,
        Self::Uninstall,
        Self::Exit,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FullDeploy => "Full deployment",
            Self::ConfigureOnly => "Configure only",
            Self::Update => "Update application",
            Self::Backup => "Backup",
            Self::Restore => "Restore from backup",
            Self::Monitor => "Monitor",
            Self::ViewLogs => "View logs",
            Self::RestartServices => "Restart services",
            Self::Uninstall => "Uninstall",
            Self::Exit => "Exit",
        }
    }
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Run one action to completion.
pub fn dispatch(wizard: &Wizard, action: MenuAction) -> DeployResult<()> {
    match action {
        MenuAction::FullDeploy => wizard.full_deploy().map(|_| ()),
        MenuAction::ConfigureOnly => wizard.configure().map(|_| ()),
        MenuAction::Update => wizard.update().map(|_| ()),
        MenuAction::Backup => wizard.backup().map(|_| ()),
        MenuAction::Restore => wizard.restore().map(|_| ()),
        MenuAction::Monitor => wizard.monitor().map(|_| ()),
        MenuAction::ViewLogs => wizard.view_logs(),
        MenuAction::RestartServices => wizard.restart(),
        MenuAction::Uninstall => wizard.uninstall().map(|_| ()),
        MenuAction::Exit => Ok(()),
    }
}

/// Loop until the operator exits.
///
/// A failed action is reported and the menu comes back. Losing the
/// terminal ends the loop with that error.
pub fn run(wizard: &Wizard) -> DeployResult<()> {
    let labels: Vec<&str> = MenuAction::ALL.iter().map(|a| a.label()).collect();

    loop {
        println!("\n{}", style("djploy").cyan().bold());
        let index = wizard.prompts().ask_choice("What would you like to do?", &labels, 0)?;
        let action = MenuAction::ALL
            .get(index)
            .copied()
            .unwrap_or(MenuAction::Exit);

        if action == MenuAction::Exit {
            return Ok(());
        }

        match dispatch(wizard, action) {
            Ok(()) => {}
            Err(e @ DeployError::Prompt(_)) => return Err(e),
            Err(e) => report(action, &e),
        }
    }
}

fn report(action: MenuAction, e: &DeployError) {
    error!("{action} failed: {e}");
    if let DeployError::StepFailed { completed, .. } = e {
        if !completed.is_empty() {
            eprintln!("  completed before the failure: {}", completed.join(", "));
        }
    }
    eprintln!("{}", style(format!("✗ {action}: {e}")).red());
}
