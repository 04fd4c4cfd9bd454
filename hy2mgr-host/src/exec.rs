//! Subprocess execution behind a trait, so callers can be driven by a script
//! in tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::process::Command;

use tracing::debug;

use crate::error::HostError;

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }

    /// `Ok(self)` on exit 0, otherwise `HostError::CommandFailed`.
    pub fn check(self, program: &str, args: &[&str]) -> Result<Self, HostError> {
        if self.success() {
            return Ok(self);
        }
        Err(HostError::CommandFailed {
            command: render_command(program, args),
            status: self
                .code
                .map(|c| format!("exit status {c}"))
                .unwrap_or_else(|| "killed by signal".to_string()),
            output: self.combined().trim().to_string(),
        })
    }
}

/// Runs host programs.
pub trait CommandRunner {
    /// Whether `program` resolves on `PATH`.
    fn exists(&self, program: &str) -> bool;

    /// Run to completion with extra environment variables. A non-zero exit is
    /// reported through [`CommandOutput::code`], not as an error.
    fn run_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, HostError>;

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        self.run_env(program, args, &[])
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn exists(&self, program: &str) -> bool {
        (**self).exists(program)
    }

    fn run_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, HostError> {
        (**self).run_env(program, args, env)
    }
}

// ---------------------------------------------------------------------------
// Real runner
// ---------------------------------------------------------------------------

/// `std::process::Command` with captured output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn run_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, HostError> {
        debug!(command = %render_command(program, args), "exec");
        let output = Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .output()
            .map_err(|source| HostError::Spawn {
                program: program.to_string(),
                source,
            })?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted runner
// ---------------------------------------------------------------------------

/// In-memory runner answering from a table keyed by the full command line.
///
/// Commands without a scripted answer succeed with empty output. Every
/// invocation is recorded for later assertions.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    installed: BTreeSet<String>,
    answers: HashMap<String, CommandOutput>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `program` as present on `PATH`.
    pub fn with_program(mut self, program: &str) -> Self {
        self.installed.insert(program.to_string());
        self
    }

    /// Answer `command` (e.g. `"ufw status"`) with `output`.
    pub fn answer(mut self, command: &str, output: CommandOutput) -> Self {
        self.answers.insert(command.to_string(), output);
        self
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.calls.borrow().iter().any(|c| c == command)
    }
}

impl CommandRunner for ScriptedRunner {
    fn exists(&self, program: &str) -> bool {
        self.installed.contains(program)
    }

    fn run_env(
        &self,
        program: &str,
        args: &[&str],
        _env: &[(&str, &str)],
    ) -> Result<CommandOutput, HostError> {
        let line = render_command(program, args);
        self.calls.borrow_mut().push(line.clone());
        Ok(self
            .answers
            .get(&line)
            .cloned()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

pub(crate) fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
