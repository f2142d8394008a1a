//! Host provisioning steps, in the order a deployment runs them.

pub mod database;
pub mod django;
pub mod env_file;
pub mod repo;
pub mod services;
pub mod user;
pub mod venv;

pub use database::{ConfigureDatabaseRole, CreateDatabase};
pub use django::{CollectStatic, CreateSuperuser, Migrate};
pub use env_file::EnvFile;
pub use repo::Repository;
pub use services::{Certificates, NginxSiteStep, RestartServices, ServiceUnits};
pub use user::SystemUser;
pub use venv::Virtualenv;

use crate::config::DeploymentConfig;
use crate::pipeline::Pipeline;

/// The full deployment: host preparation, application setup,
/// process supervision, proxy and certificates.
#[must_use]
pub fn deploy_pipeline(config: &DeploymentConfig) -> Pipeline {
    Pipeline::new()
        .step(SystemUser)
        .step(Repository)
        .step(CreateDatabase)
        .step(ConfigureDatabaseRole)
        .step(Virtualenv)
        .step(EnvFile)
        .step(Migrate)
        .step(CollectStatic)
        .step_if(config.create_superuser, CreateSuperuser)
        .step(ServiceUnits)
        .step(NginxSiteStep)
        .step(Certificates)
}

/// Pull new code into an existing deployment and restart it.
#[must_use]
pub fn update_pipeline() -> Pipeline {
    Pipeline::new()
        .step(Repository)
        .step(Virtualenv)
        .step(Migrate)
        .step(CollectStatic)
        .step(RestartServices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_order() {
        let mut config = DeploymentConfig::for_project("shop");
        config.create_superuser = true;

        assert_eq!(
            deploy_pipeline(&config).names(),
            vec![
                "system-user",
                "repository",
                "database",
                "database-role",
                "virtualenv",
                "env-file",
                "migrations",
                "static-files",
                "superuser",
                "services",
                "nginx-site",
                "certificates",
            ]
        );
    }

    #[test]
    fn superuser_step_only_when_enabled() {
        let config = DeploymentConfig::for_project("shop");

        assert!(!deploy_pipeline(&config).names().contains(&"superuser"));
    }

    #[test]
    fn update_order() {
        assert_eq!(
            update_pipeline().names(),
            vec!["repository", "virtualenv", "migrations", "static-files", "restart-services"]
        );
    }
}
