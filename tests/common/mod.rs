#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::rc::Rc;

use djploy::cmd::format_command;
use djploy::error::{DeployError, DeployResult};
use djploy::{DeploymentConfig, Prompter, Shell};

/// One command seen by [`RecordingShell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Call {
    pub fn line(&self) -> String {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        format_command(&self.program, &args)
    }
}

struct Failure {
    pattern: String,
    stderr: String,
    /// `None` fails every match.
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    missing: BTreeSet<String>,
    failures: Vec<Failure>,
    responses: Vec<(String, String)>,
    roles: BTreeSet<String>,
    databases: BTreeSet<String>,
}

/// A [`Shell`] that records every command instead of running it.
///
/// Clones share state, so a clone handed to a `Wizard` can still be
/// inspected by the test. `psql` existence queries and `CREATE`
/// statements are answered from a simulated catalog.
#[derive(Clone, Default)]
pub struct RecordingShell {
    state: Rc<RefCell<State>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `program` as absent from `PATH`.
    pub fn missing(self, program: &str) -> Self {
        self.state.borrow_mut().missing.insert(program.to_string());
        self
    }

    /// Fail every command line containing `pattern`.
    pub fn fail(self, pattern: &str, stderr: &str) -> Self {
        self.push_failure(pattern, stderr, None)
    }

    /// Fail only the first `times` command lines containing `pattern`.
    pub fn fail_times(self, pattern: &str, stderr: &str, times: usize) -> Self {
        self.push_failure(pattern, stderr, Some(times))
    }

    fn push_failure(self, pattern: &str, stderr: &str, remaining: Option<usize>) -> Self {
        self.state.borrow_mut().failures.push(Failure {
            pattern: pattern.to_string(),
            stderr: stderr.to_string(),
            remaining,
        });
        self
    }

    /// Answer command lines containing `pattern` with `stdout`. Later
    /// registrations take precedence.
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.state
            .borrow_mut()
            .responses
            .push((pattern.to_string(), stdout.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Call::line).collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(pattern)).count()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.count(pattern) > 0
    }

    pub fn clear(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state.borrow().databases.contains(name)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.state.borrow().roles.contains(name)
    }

    fn record(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> String {
        let call = Call {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            stdin: stdin.map(|s| String::from_utf8_lossy(s).into_owned()),
        };
        let line = call.line();
        self.state.borrow_mut().calls.push(call);
        line
    }

    fn failure(&self, line: &str) -> Option<DeployError> {
        let mut state = self.state.borrow_mut();
        let failure = state
            .failures
            .iter_mut()
            .find(|f| line.contains(f.pattern.as_str()) && f.remaining != Some(0))?;
        if let Some(n) = failure.remaining.as_mut() {
            *n -= 1;
        }
        Some(DeployError::CommandFailed {
            command: line.to_string(),
            code: Some(1),
            stderr: failure.stderr.clone(),
        })
    }

    /// Latest matching registration wins.
    fn response(&self, line: &str) -> String {
        self.state
            .borrow()
            .responses
            .iter()
            .rev()
            .find(|(p, _)| line.contains(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default()
    }

    fn answer(&self, program: &str, args: &[&str], stdin: Option<&[u8]>) -> DeployResult<String> {
        let line = self.record(program, args, stdin);
        if let Some(e) = self.failure(&line) {
            return Err(e);
        }

        if program == "sudo" && args.contains(&"psql") && args.contains(&"-tAc") {
            let sql = args.last().copied().unwrap_or_default();
            return self.state.borrow_mut().psql(&line, sql);
        }

        Ok(self.response(&line))
    }
}

impl State {
    fn psql(&mut self, line: &str, sql: &str) -> DeployResult<String> {
        let exists = |set: &BTreeSet<String>| {
            let name = between(sql, '\'');
            Ok(if set.contains(name) { "1" } else { "" }.to_string())
        };
        let create = |set: &mut BTreeSet<String>, kind: &str| {
            let name = between(sql, '"').to_string();
            if set.insert(name.clone()) {
                Ok(String::new())
            } else {
                Err(DeployError::CommandFailed {
                    command: line.to_string(),
                    code: Some(1),
                    stderr: format!("ERROR:  {kind} \"{name}\" already exists"),
                })
            }
        };

        if sql.contains("FROM pg_roles") {
            exists(&self.roles)
        } else if sql.contains("FROM pg_database") {
            exists(&self.databases)
        } else if sql.starts_with("CREATE ROLE") {
            create(&mut self.roles, "role")
        } else if sql.starts_with("CREATE DATABASE") {
            create(&mut self.databases, "database")
        } else if sql.starts_with("DROP DATABASE") {
            self.databases.remove(between(sql, '"'));
            Ok(String::new())
        } else if sql.starts_with("DROP ROLE") {
            self.roles.remove(between(sql, '"'));
            Ok(String::new())
        } else {
            Ok(String::new())
        }
    }
}

fn between(text: &str, quote: char) -> &str {
    text.split(quote).nth(1).unwrap_or_default()
}

impl Shell for RecordingShell {
    fn run(&self, program: &str, args: &[&str]) -> DeployResult<String> {
        self.answer(program, args, None)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> DeployResult<String> {
        let line = self.record(program, args, None);
        Ok(self.response(&line))
    }

    fn run_to_file(&self, program: &str, args: &[&str], path: &Path) -> DeployResult<()> {
        let line = self.record(program, args, None);
        if let Some(e) = self.failure(&line) {
            return Err(e);
        }
        std::fs::write(path, self.response(&line))?;
        Ok(())
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> DeployResult<()> {
        self.answer(program, args, None).map(|_| ())
    }

    fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        stdin_data: &[u8],
    ) -> DeployResult<String> {
        self.answer(program, args, Some(stdin_data))
    }

    fn command_exists(&self, program: &str) -> bool {
        !self.state.borrow().missing.contains(program)
    }
}

/// A scripted answer.
#[derive(Debug, Clone)]
pub enum Answer {
    /// Accept whatever default the question offers.
    Default,
    Text(String),
    Yes,
    No,
    Choice(usize),
}

pub fn text(value: &str) -> Answer {
    Answer::Text(value.to_string())
}

/// A [`Prompter`] replaying answers in order. Running out of answers
/// behaves like a closed terminal.
#[derive(Clone, Default)]
pub struct ScriptedPrompter {
    answers: Rc<RefCell<VecDeque<Answer>>>,
    asked: Rc<RefCell<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Rc::new(RefCell::new(answers.into_iter().collect())),
            asked: Rc::default(),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }

    fn next(&self, prompt: &str) -> DeployResult<Answer> {
        self.asked.borrow_mut().push(prompt.to_string());
        self.answers.borrow_mut().pop_front().ok_or_else(|| {
            DeployError::Prompt(dialoguer::Error::IO(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "no terminal",
            )))
        })
    }
}

impl Prompter for ScriptedPrompter {
    fn ask_text(&self, prompt: &str, default: &str) -> DeployResult<String> {
        match self.next(prompt)? {
            Answer::Default => Ok(default.to_string()),
            Answer::Text(t) => Ok(t),
            other => panic!("{prompt}: expected text, scripted {other:?}"),
        }
    }

    fn ask_secret(&self, prompt: &str) -> DeployResult<String> {
        match self.next(prompt)? {
            Answer::Default => Ok(String::new()),
            Answer::Text(t) => Ok(t),
            other => panic!("{prompt}: expected secret, scripted {other:?}"),
        }
    }

    fn ask_yes_no(&self, prompt: &str, default: bool) -> DeployResult<bool> {
        match self.next(prompt)? {
            Answer::Default => Ok(default),
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            other => panic!("{prompt}: expected yes/no, scripted {other:?}"),
        }
    }

    fn ask_choice(&self, prompt: &str, choices: &[&str], default: usize) -> DeployResult<usize> {
        match self.next(prompt)? {
            Answer::Default => Ok(default),
            Answer::Choice(i) => {
                assert!(i < choices.len(), "{prompt}: choice {i} out of range");
                Ok(i)
            }
            other => panic!("{prompt}: expected choice, scripted {other:?}"),
        }
    }
}

/// The `shop` project rooted in `dir`, ready to validate.
pub fn shop_config(dir: &Path) -> DeploymentConfig {
    let mut config = DeploymentConfig::for_project("shop");
    config.project_dir = dir.join("home/shop/shop").display().to_string();
    config.repo_url = "https://git.example.com/shop.git".into();
    config.db_password = "s3cret".into();
    config.domain = "shop.example.com".into();
    config
}

/// Certbot output for a certificate expiring at `expiry`
/// (`YYYY-mm-dd HH:MM:SS`).
pub fn certbot_listing(domain: &str, expiry: &str) -> String {
    format!(
        "Found the following certs:\n  \
           Certificate Name: {domain}\n    \
             Domains: {domain}\n    \
             Expiry Date: {expiry}+00:00 (VALID: 0 days)\n    \
             Certificate Path: /etc/letsencrypt/live/{domain}/fullchain.pem\n"
    )
}
