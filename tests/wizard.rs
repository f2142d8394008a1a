mod common;

use std::fs;
use std::path::Path;

use common::{Answer, RecordingShell, ScriptedPrompter, shop_config, text};
use djploy::backup::{self, BackupRecord};
use djploy::cli::{self, Cli};
use djploy::error::DeployError;
use djploy::menu::{self, MenuAction};
use djploy::{DeploymentConfig, HostPaths, Wizard};

fn answers_for(project_dir: &Path) -> Vec<Answer> {
    vec![
        text("shop"),
        Answer::Default,
        text(&project_dir.display().to_string()),
        text("https://git.example.com/shop.git"),
        Answer::Default,
        Answer::Choice(0),
        Answer::Default,
        Answer::Default,
        text("s3cret"),
        Answer::Default,
        Answer::No,
        text("shop.example.com"),
        Answer::No,
        Answer::No,
        Answer::No,
        Answer::Yes,
    ]
}

fn healthy_shell() -> RecordingShell {
    RecordingShell::new()
        .respond("python3 --version", "Python 3.11.2")
        .respond("systemctl is-active", "active")
}

fn wizard(root: &Path, shell: &RecordingShell, prompter: &ScriptedPrompter) -> Wizard {
    Wizard::new()
        .shell(shell.clone())
        .prompter(prompter.clone())
        .paths(HostPaths::under(root))
        .quiet()
}

fn save(root: &Path, config: &DeploymentConfig) {
    config.save(&HostPaths::under(root).config_file).unwrap();
}

#[test]
fn configure_only_saves_answers() {
    let root = tempfile::tempdir().unwrap();
    let project_dir = root.path().join("home/shop/shop");
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new(answers_for(&project_dir));

    let config = wizard(root.path(), &shell, &prompter).configure().unwrap();

    assert_eq!(prompter.remaining(), 0);
    assert_eq!(config.db_name, "shop_db");
    assert_eq!(config.db_password, "s3cret");
    assert_eq!(config.domain, "shop.example.com");
    assert!(!config.enable_ssl);
    let saved = DeploymentConfig::load(&HostPaths::under(root.path()).config_file)
        .unwrap()
        .unwrap();
    assert_eq!(saved, config);
    assert!(shell.calls().is_empty());
}

#[test]
fn zero_workers_are_asked_again() {
    let root = tempfile::tempdir().unwrap();
    let project_dir = root.path().join("home/shop/shop");
    let mut answers = answers_for(&project_dir);
    answers.splice(9..10, [text("0"), text("4")]);
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new(answers);

    let config = wizard(root.path(), &shell, &prompter).configure().unwrap();

    assert_eq!(config.gunicorn_workers, 4);
    assert_eq!(prompter.remaining(), 0);
    let asked = prompter.asked();
    assert_eq!(asked.iter().filter(|q| q.as_str() == "Gunicorn workers").count(), 2);
}

#[test]
fn full_deploy_runs_every_step() {
    let root = tempfile::tempdir().unwrap();
    let project_dir = root.path().join("home/shop/shop");
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new(answers_for(&project_dir));
    let paths = HostPaths::under(root.path());

    let report = wizard(root.path(), &shell, &prompter).full_deploy().unwrap();

    assert_eq!(report.completed().len(), 11);
    assert!(shell.ran("git clone"));
    assert!(shell.ran("manage.py migrate --noinput"));
    assert!(shell.ran("manage.py collectstatic --noinput"));
    assert!(shell.ran("systemctl restart shop.service"));
    assert!(!shell.ran("certbot"));
    assert!(paths.unit_file("shop.service").exists());
    assert!(!paths.unit_file("shop-celery.service").exists());

    let site = fs::read_to_string(paths.nginx_site("shop")).unwrap();
    assert!(site.contains("server_name shop.example.com;"));
    assert!(site.contains("server unix:/run/shop/shop.sock"));
    assert!(fs::read_to_string(project_dir.join(".env")).unwrap().contains("ALLOWED_HOSTS=shop.example.com"));
}

#[test]
fn redeploy_backs_up_before_migrating() {
    let root = tempfile::tempdir().unwrap();
    let config = shop_config(root.path());
    save(root.path(), &config);
    fs::create_dir_all(Path::new(&config.project_dir).join(".git")).unwrap();
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([]);

    wizard(root.path(), &shell, &prompter).deploy_saved().unwrap();

    let lines = shell.lines();
    let dump = lines.iter().position(|l| l.contains("pg_dump")).unwrap();
    let migrate = lines.iter().position(|l| l.contains("manage.py migrate")).unwrap();
    assert!(dump < migrate);
    assert_eq!(
        backup::list_backups(&HostPaths::under(root.path()).backup_root, Some("shop"))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn first_deploy_takes_no_backup() {
    let root = tempfile::tempdir().unwrap();
    save(root.path(), &shop_config(root.path()));
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([]);

    wizard(root.path(), &shell, &prompter).deploy_saved().unwrap();

    assert!(!shell.ran("pg_dump"));
}

#[test]
fn preflight_failure_mutates_nothing() {
    let root = tempfile::tempdir().unwrap();
    let config = shop_config(root.path());
    save(root.path(), &config);
    let shell = healthy_shell().missing("psql").missing("git");
    let prompter = ScriptedPrompter::new([]);

    let err = wizard(root.path(), &shell, &prompter).deploy_saved().unwrap_err();

    assert!(matches!(err, DeployError::PreflightFailed { ref problems } if problems.len() == 2));
    assert_eq!(shell.lines(), vec!["python3 --version"]);
}

#[test]
fn flags_require_saved_configuration() {
    let root = tempfile::tempdir().unwrap();
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([]);

    let err = wizard(root.path(), &shell, &prompter).monitor().unwrap_err();

    assert!(matches!(err, DeployError::ConfigMissing(_)));
}

#[test]
fn backup_then_list_and_restore() {
    let root = tempfile::tempdir().unwrap();
    let config = shop_config(root.path());
    save(root.path(), &config);
    let paths = HostPaths::under(root.path());
    fs::create_dir_all(paths.systemd_dir.clone()).unwrap();
    fs::write(paths.unit_file("shop.service"), "[Unit]\n").unwrap();
    let dump = "-- PostgreSQL database dump\n\nSELECT 1;\n\n";
    let shell = healthy_shell().respond("pg_dump", dump);
    let prompter = ScriptedPrompter::new([Answer::Choice(0), Answer::Yes]);
    let w = wizard(root.path(), &shell, &prompter);

    let record = w.backup().unwrap();

    assert_eq!(fs::read_to_string(record.path.join("database.sql")).unwrap(), dump);
    assert!(record.path.join("config/shop.service").exists());
    let manifest = record.manifest().unwrap();
    assert_eq!(manifest.project, "shop");
    assert_eq!(manifest.config_files, vec!["shop.service"]);
    assert!(shell.ran("sudo -u postgres -H pg_dump --clean --if-exists shop_db"));
    let tar = shell.lines().into_iter().find(|l| l.starts_with("tar")).unwrap();
    for exclude in backup::ARCHIVE_EXCLUDES {
        assert!(tar.contains(&format!("--exclude={exclude}")));
    }

    let listed: Vec<BackupRecord> = backup::list_backups(&paths.backup_root, Some("shop")).unwrap();
    assert_eq!(listed, vec![record.clone()]);

    let restored = w.restore().unwrap();
    assert_eq!(restored, Some(record));
    assert!(!shell.ran("psql shop_db"));
}

#[test]
fn update_backs_up_first() {
    let root = tempfile::tempdir().unwrap();
    let config = shop_config(root.path());
    save(root.path(), &config);
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([]);

    let report = wizard(root.path(), &shell, &prompter).update().unwrap();

    let lines = shell.lines();
    let dump = lines.iter().position(|l| l.contains("pg_dump")).unwrap();
    let clone = lines.iter().position(|l| l.contains("git clone")).unwrap();
    assert!(dump < clone);
    assert_eq!(report.completed().last().map(String::as_str), Some("restart-services"));
    assert!(shell.ran("systemctl reload nginx"));
}

#[test]
fn monitor_reports_units() {
    let root = tempfile::tempdir().unwrap();
    let mut config = shop_config(root.path());
    config.use_celery = true;
    config.use_celery_beat = true;
    save(root.path(), &config);
    let shell = healthy_shell()
        .respond("is-active shop-celery.service", "failed")
        .respond("is-active shop-celerybeat.service", "activating");
    let prompter = ScriptedPrompter::new([]);

    let report = wizard(root.path(), &shell, &prompter).monitor().unwrap();

    assert_eq!(
        report.services,
        vec![
            ("shop.service".to_string(), "active".to_string()),
            ("shop-celery.service".to_string(), "failed".to_string()),
            ("shop-celerybeat.service".to_string(), "activating".to_string()),
            ("nginx".to_string(), "active".to_string()),
        ]
    );
    assert!(!report.all_active());
}

#[test]
fn uninstall_asks_before_each_removal() {
    let root = tempfile::tempdir().unwrap();
    let config = shop_config(root.path());
    save(root.path(), &config);
    let paths = HostPaths::under(root.path());
    fs::create_dir_all(&paths.systemd_dir).unwrap();
    fs::write(paths.unit_file("shop.service"), "[Unit]\n").unwrap();
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([Answer::Yes, Answer::No, Answer::No]);

    let removed = wizard(root.path(), &shell, &prompter).uninstall().unwrap();

    assert!(removed);
    assert!(!paths.unit_file("shop.service").exists());
    assert!(shell.ran("systemctl disable shop.service"));
    assert!(!shell.ran("DROP DATABASE"));
    assert!(!shell.ran("userdel"));
}

#[test]
fn declined_uninstall_touches_nothing() {
    let root = tempfile::tempdir().unwrap();
    save(root.path(), &shop_config(root.path()));
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([Answer::No]);

    let removed = wizard(root.path(), &shell, &prompter).uninstall().unwrap();

    assert!(!removed);
    assert!(shell.calls().is_empty());
}

#[test]
fn menu_survives_failed_actions() {
    let root = tempfile::tempdir().unwrap();
    let shell = healthy_shell();
    let exit = MenuAction::ALL.len() - 1;
    let backup = MenuAction::ALL.iter().position(|a| *a == MenuAction::Backup).unwrap();
    let prompter = ScriptedPrompter::new([Answer::Choice(backup), Answer::Choice(exit)]);

    menu::run(&wizard(root.path(), &shell, &prompter)).unwrap();

    assert_eq!(prompter.remaining(), 0);
}

#[test]
fn menu_ends_when_terminal_is_gone() {
    let root = tempfile::tempdir().unwrap();
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([]);

    let err = menu::run(&wizard(root.path(), &shell, &prompter)).unwrap_err();

    assert!(matches!(err, DeployError::Prompt(_)));
}

#[test]
fn renew_flag_uses_given_registry() {
    let root = tempfile::tempdir().unwrap();
    let registry = root.path().join("custom-domains.conf");
    fs::write(&registry, "# empty\n").unwrap();
    let shell = healthy_shell();
    let prompter = ScriptedPrompter::new([]);
    let args = Cli::parse_lenient([
        "djploy",
        "--renew-certs",
        "--domains",
        registry.to_str().unwrap(),
    ]);

    cli::execute(&wizard(root.path(), &shell, &prompter), &args).unwrap();

    assert!(shell.calls().is_empty());
}
