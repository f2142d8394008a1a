use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use console::style;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cmd::{Shell, sudo_args};
use crate::config::DeploymentConfig;
use crate::error::{DeployError, DeployResult};
use crate::paths::HostPaths;
use crate::prompt::Prompter;
use crate::systemd;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths left out of the file archive: rebuildable or VCS state.
pub const ARCHIVE_EXCLUDES: &[&str] = &[
    "venv",
    "__pycache__",
    "*.pyc",
    "node_modules",
    "public/static",
    ".git",
];

pub const DATABASE_DUMP: &str = "database.sql";
pub const FILES_ARCHIVE: &str = "files.tar.gz";
pub const CONFIG_DIR: &str = "config";
pub const MANIFEST: &str = "manifest.json";

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub project: String,
    pub created_at: DateTime<Utc>,
    pub database: String,
    pub project_dir: String,
    pub excludes: Vec<String>,
    pub config_files: Vec<String>,
    pub tool_version: String,
}

/// One backup directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub name: String,
    pub path: PathBuf,
    pub project: String,
    pub taken_at: NaiveDateTime,
}

impl BackupRecord {
    /// Parse `<project>_<YYYYmmdd_HHMMSS>`.
    #[must_use]
    pub fn from_dir(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let mut parts = name.rsplitn(3, '_');
        let time = parts.next()?;
        let date = parts.next()?;
        let project = parts.next()?;
        if project.is_empty() || date.len() != 8 || time.len() != 6 {
            return None;
        }
        let taken_at =
            NaiveDateTime::parse_from_str(&format!("{date}_{time}"), STAMP_FORMAT).ok()?;
        Some(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            project: project.to_string(),
            taken_at,
        })
    }

    pub fn manifest(&self) -> DeployResult<BackupManifest> {
        let raw = fs::read_to_string(self.path.join(MANIFEST))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[must_use]
pub fn record_name(project: &str, now: DateTime<Utc>) -> String {
    format!("{project}_{}", now.format(STAMP_FORMAT))
}

/// Snapshot the database, project files and active service
/// definitions into a fresh timestamped directory.
pub fn create_backup(
    shell: &dyn Shell,
    paths: &HostPaths,
    config: &DeploymentConfig,
    now: DateTime<Utc>,
) -> DeployResult<BackupRecord> {
    let name = record_name(&config.project_name, now);
    let dir = paths.backup_root.join(&name);
    fs::create_dir_all(&paths.backup_root)?;
    fs::create_dir(&dir)?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    info!("backing up {} to {}", config.project_name, dir.display());

    let dump_args = sudo_args(
        "postgres",
        "pg_dump",
        &["--clean", "--if-exists", &config.db_name],
    );
    shell.run_to_file("sudo", &dump_args, &dir.join(DATABASE_DUMP))?;

    let project_dir = Path::new(&config.project_dir);
    let archive = dir.join(FILES_ARCHIVE).display().to_string();
    let parent = project_dir
        .parent()
        .map_or_else(|| "/".to_string(), |p| p.display().to_string());
    let base = project_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DeployError::Other(format!("cannot archive {}", config.project_dir)))?;

    let excludes: Vec<String> = ARCHIVE_EXCLUDES
        .iter()
        .map(|e| format!("--exclude={e}"))
        .collect();
    let mut args: Vec<&str> = vec!["-czf", archive.as_str()];
    args.extend(excludes.iter().map(String::as_str));
    args.extend(["-C", parent.as_str(), base.as_str()]);
    shell.run("tar", &args)?;

    let config_files = copy_definitions(paths, config, &dir.join(CONFIG_DIR))?;

    let manifest = BackupManifest {
        project: config.project_name.clone(),
        created_at: now,
        database: config.db_name.clone(),
        project_dir: config.project_dir.clone(),
        excludes: ARCHIVE_EXCLUDES.iter().map(ToString::to_string).collect(),
        config_files,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    fs::write(dir.join(MANIFEST), serde_json::to_string_pretty(&manifest)?)?;

    info!("backup {name} complete");
    BackupRecord::from_dir(&dir)
        .ok_or_else(|| DeployError::Other(format!("unrecognised backup name {name}")))
}

fn copy_definitions(
    paths: &HostPaths,
    config: &DeploymentConfig,
    target: &Path,
) -> DeployResult<Vec<String>> {
    fs::create_dir_all(target)?;
    let mut sources: Vec<PathBuf> = systemd::unit_names(config)
        .iter()
        .map(|unit| paths.unit_file(unit))
        .collect();
    sources.push(paths.nginx_site(&config.project_name));

    let mut copied = Vec::new();
    for source in sources {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        if !source.exists() {
            warn!("{} not present, not backed up", source.display());
            continue;
        }
        fs::copy(&source, target.join(file_name))?;
        copied.push(file_name.to_string_lossy().into_owned());
    }
    Ok(copied)
}

/// Backups under the root, newest first. Directories that do not
/// look like backups are ignored.
pub fn list_backups(root: &Path, project: Option<&str>) -> DeployResult<Vec<BackupRecord>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut records: Vec<BackupRecord> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| BackupRecord::from_dir(&e.path()))
        .filter(|r| project.is_none_or(|p| r.project == p))
        .collect();
    records.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
    Ok(records)
}

/// Manual restore steps for `record`.
#[must_use]
pub fn runbook(record: &BackupRecord, paths: &HostPaths, config: &DeploymentConfig) -> String {
    let dir = record.path.display();
    let units = systemd::unit_names(config).join(" ");
    let parent = Path::new(&config.project_dir)
        .parent()
        .map_or_else(|| "/".to_string(), |p| p.display().to_string());
    format!(
        "1. Stop the application:\n   \
            systemctl stop {units}\n\
         2. Restore the database:\n   \
            sudo -u postgres psql {db} < {dir}/{DATABASE_DUMP}\n\
         3. Restore the project files:\n   \
            tar -xzf {dir}/{FILES_ARCHIVE} -C {parent}\n\
         4. Restore service definitions:\n   \
            cp {dir}/{CONFIG_DIR}/*.service {systemd}/\n   \
            cp {dir}/{CONFIG_DIR}/{project} {site}\n\
         5. Rebuild the virtualenv and collect static files (run Update).\n\
         6. Start again:\n   \
            systemctl daemon-reload && systemctl start {units}\n   \
            nginx -t && systemctl reload nginx\n",
        db = config.db_name,
        systemd = paths.systemd_dir.display(),
        project = config.project_name,
        site = paths.nginx_site(&config.project_name).display(),
    )
}

/// Select a backup, confirm, and print the runbook. Nothing on the
/// host is replaced.
pub fn restore(
    prompter: &dyn Prompter,
    paths: &HostPaths,
    config: &DeploymentConfig,
) -> DeployResult<Option<BackupRecord>> {
    let records = list_backups(&paths.backup_root, Some(&config.project_name))?;
    if records.is_empty() {
        warn!("no backups for {} in {}", config.project_name, paths.backup_root.display());
        return Ok(None);
    }

    let labels: Vec<String> = records
        .iter()
        .map(|r| format!("{} ({})", r.name, r.taken_at.format("%Y-%m-%d %H:%M:%S")))
        .collect();
    let choices: Vec<&str> = labels.iter().map(String::as_str).collect();
    let index = prompter.ask_choice("Backup to restore", &choices, 0)?;
    let record = records
        .into_iter()
        .nth(index)
        .ok_or_else(|| DeployError::Other(format!("no backup at index {index}")))?;

    let question = format!("Restore from {}? This prints the manual procedure", record.name);
    if !prompter.ask_yes_no(&question, false)? {
        info!("restore cancelled");
        return Ok(None);
    }

    println!("\n{}", style("Restore procedure").bold());
    println!("{}", runbook(&record, paths, config));
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_name_round_trips() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 5, 3).unwrap();
        let name = record_name("my_shop", now);

        assert_eq!(name, "my_shop_20261016_090503");
        let record = BackupRecord::from_dir(Path::new(&format!("/b/{name}"))).unwrap();
        assert_eq!(record.project, "my_shop");
        assert_eq!(record.taken_at, now.naive_utc());
    }

    #[test]
    fn foreign_directories_are_ignored() {
        assert!(BackupRecord::from_dir(Path::new("/b/lost+found")).is_none());
        assert!(BackupRecord::from_dir(Path::new("/b/_20261016_090503")).is_none());
        assert!(BackupRecord::from_dir(Path::new("/b/shop_2026-10-16")).is_none());
        assert!(BackupRecord::from_dir(Path::new("/b/é123456789012345")).is_none());
        assert!(BackupRecord::from_dir(Path::new("/b/café_2026101_6120000")).is_none());
    }

    #[test]
    fn non_ascii_names_do_not_break_listing() {
        let root = tempfile::tempdir().unwrap();
        for name in ["shop_20261016_120000", "é123456789012345", "ünïcödé_shop"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }

        let records = list_backups(root.path(), None).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].project, "shop");
    }

    #[test]
    fn list_is_newest_first() {
        let root = tempfile::tempdir().unwrap();
        for name in [
            "shop_20260101_000000",
            "shop_20261016_120000",
            "blog_20261017_000000",
            "shop_20260601_000000",
            "notes",
        ] {
            fs::create_dir(root.path().join(name)).unwrap();
        }

        let names: Vec<String> = list_backups(root.path(), Some("shop"))
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();

        assert_eq!(
            names,
            vec!["shop_20261016_120000", "shop_20260601_000000", "shop_20260101_000000"]
        );
        assert_eq!(list_backups(root.path(), None).unwrap().len(), 4);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let root = tempfile::tempdir().unwrap();
        assert!(list_backups(&root.path().join("absent"), None).unwrap().is_empty());
    }
}
