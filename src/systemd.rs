use std::path::PathBuf;

use tracing::info;

use crate::cmd::Shell;
use crate::config::DeploymentConfig;
use crate::error::DeployResult;
use crate::install::{self, Activation};
use crate::paths::HostPaths;

/// Which long-running process a unit supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessClass {
    Web,
    Worker,
    Scheduler,
}

/// A generated systemd unit, keyed by project name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit {
    pub name: String,
    pub class: ProcessClass,
    pub content: String,
}

/// Unit file names for a project, in start order.
#[must_use]
pub fn unit_names(config: &DeploymentConfig) -> Vec<String> {
    render_units(config).into_iter().map(|u| u.name).collect()
}

/// Render one unit per enabled process class. Without Celery only
/// the web unit is produced.
#[must_use]
pub fn render_units(config: &DeploymentConfig) -> Vec<ServiceUnit> {
    let project = &config.project_name;
    let mut units = vec![ServiceUnit {
        name: format!("{project}.service"),
        class: ProcessClass::Web,
        content: web_unit(config),
    }];

    if config.use_celery {
        units.push(ServiceUnit {
            name: format!("{project}-celery.service"),
            class: ProcessClass::Worker,
            content: celery_unit(config),
        });
        if config.use_celery_beat {
            units.push(ServiceUnit {
                name: format!("{project}-celerybeat.service"),
                class: ProcessClass::Scheduler,
                content: celery_beat_unit(config),
            });
        }
    }

    units
}

fn web_unit(c: &DeploymentConfig) -> String {
    format!(
        "[Unit]\n\
         Description=Gunicorn for {project}\n\
         After=network.target postgresql.service\n\
         \n\
         [Service]\n\
         Type=notify\n\
         User={user}\n\
         Group=www-data\n\
         RuntimeDirectory={project}\n\
         WorkingDirectory={dir}\n\
         EnvironmentFile={env}\n\
         ExecStart={gunicorn} --workers {workers} --bind unix:{socket} --umask 007 {wsgi}\n\
         ExecReload=/bin/kill -s HUP $MAINPID\n\
         KillMode=mixed\n\
         Restart=on-failure\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        project = c.project_name,
        user = c.system_user,
        dir = c.project_dir,
        env = c.env_file(),
        gunicorn = c.venv_bin("gunicorn"),
        workers = c.gunicorn_workers,
        socket = c.socket_path(),
        wsgi = c.wsgi_app(),
    )
}

fn celery_unit(c: &DeploymentConfig) -> String {
    format!(
        "[Unit]\n\
         Description=Celery worker for {project}\n\
         After=network.target {project}.service\n\
         \n\
         [Service]\n\
         Type=simple\n\
         User={user}\n\
         Group={user}\n\
         WorkingDirectory={dir}\n\
         EnvironmentFile={env}\n\
         ExecStart={celery} -A {project} worker --loglevel=INFO\n\
         Restart=on-failure\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        project = c.project_name,
        user = c.system_user,
        dir = c.project_dir,
        env = c.env_file(),
        celery = c.venv_bin("celery"),
    )
}

fn celery_beat_unit(c: &DeploymentConfig) -> String {
    format!(
        "[Unit]\n\
         Description=Celery beat for {project}\n\
         After=network.target {project}-celery.service\n\
         \n\
         [Service]\n\
         Type=simple\n\
         User={user}\n\
         Group={user}\n\
         WorkingDirectory={dir}\n\
         EnvironmentFile={env}\n\
         ExecStart={celery} -A {project} beat --loglevel=INFO --schedule {dir}/celerybeat-schedule\n\
         Restart=on-failure\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        project = c.project_name,
        user = c.system_user,
        dir = c.project_dir,
        env = c.env_file(),
        celery = c.venv_bin("celery"),
    )
}

/// Write every unit, verify each with `systemd-analyze`, then
/// enable and (re)start them. If any unit fails verification, all
/// of them keep their previous definitions and nothing is reloaded.
pub fn install_units(
    shell: &dyn Shell,
    paths: &HostPaths,
    config: &DeploymentConfig,
) -> DeployResult<()> {
    let units = render_units(config);
    let files: Vec<(PathBuf, String)> = units
        .iter()
        .map(|unit| (paths.unit_file(&unit.name), unit.content.clone()))
        .collect();

    let activation = install::install_all_validated(&files, |path| {
        let path = path.display().to_string();
        shell.run("systemd-analyze", &["verify", &path]).map(|_| ())
    })?;
    let changed = activation == Activation::Changed;

    if changed {
        shell.run("systemctl", &["daemon-reload"])?;
    }

    for unit in &units {
        info!("Starting {}...", unit.name);
        shell.run("systemctl", &["enable", &unit.name])?;
        shell.run("systemctl", &["restart", &unit.name])?;
    }

    Ok(())
}

/// Restart every unit of the project.
pub fn restart_all(shell: &dyn Shell, config: &DeploymentConfig) -> DeployResult<()> {
    for name in unit_names(config) {
        info!("Restarting {name}...");
        shell.run("systemctl", &["restart", &name])?;
    }
    Ok(())
}
