// ABOUTME: Command description, captured output, and the tokio-backed runner.
// ABOUTME: Commands for the database user are wrapped in a privilege-drop prefix.

use async_trait::async_trait;
use nonempty::NonEmpty;
use snafu::ResultExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::error::{ExecutionError, ProcessError, SpawnSnafu, TimeoutSnafu};

/// An external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Run as this system user instead of the invoking one.
    pub run_as: Option<String>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            run_as: None,
            current_dir: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build a command from an argv-style list (`["sv", "status"]`).
    pub fn from_argv(argv: &NonEmpty<String>) -> Self {
        Self::new(&argv.head).args(argv.tail.iter().cloned())
    }

    /// File name of the program, used to identify tools in logs.
    pub fn program_name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError>;

    /// Run a command, treating a non-zero exit as a failure of `action`.
    async fn run_checked(
        &self,
        action: &str,
        command: &CommandSpec,
    ) -> Result<CommandOutput, ExecutionError> {
        let output = self
            .run(command)
            .await
            .map_err(|source| ExecutionError::Process {
                action: action.to_string(),
                source,
            })?;

        if output.success() {
            Ok(output)
        } else {
            Err(ExecutionError::NonZeroExit {
                action: action.to_string(),
                command: command.to_string(),
                output,
            })
        }
    }
}

/// Runs commands on the local system with tokio.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    privilege_drop: Vec<String>,
}

impl SystemRunner {
    /// `privilege_drop` is the argv prefix used for `run_as` commands; the
    /// user name is appended to it (for example `["chpst", "-u"]`).
    pub fn new(privilege_drop: Vec<String>) -> Self {
        Self { privilege_drop }
    }

    fn build(&self, spec: &CommandSpec) -> Command {
        let mut command = match (&spec.run_as, self.privilege_drop.split_first()) {
            (Some(user), Some((wrapper, prefix))) => {
                let mut c = Command::new(wrapper);
                c.args(prefix).arg(user).arg(&spec.program);
                c
            }
            _ => Command::new(&spec.program),
        };

        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        command
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(vec!["chpst".to_string(), "-u".to_string()])
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        tracing::debug!(command = %spec, run_as = ?spec.run_as, "running command");

        let program = program_label(&spec.program);
        let child = self.build(spec).output();

        let output = match spec.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child)
                .await
                .map_err(|_| {
                    TimeoutSnafu {
                        program: program.clone(),
                        timeout,
                    }
                    .build()
                })?,
            None => child.await,
        }
        .context(SpawnSnafu { program })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.success() {
            tracing::debug!(command = %spec, exit_code = result.exit_code, "command failed");
        }

        Ok(result)
    }
}

fn program_label(program: &Path) -> String {
    program.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("/opt/pg/12/bin/initdb")
            .args(["-D", "/var/data.12"])
            .arg("--locale=C");
        assert_eq!(spec.to_string(), "/opt/pg/12/bin/initdb -D /var/data.12 --locale=C");
        assert_eq!(spec.program_name(), "initdb");
    }

    #[test]
    fn from_argv_splits_program() {
        let argv = NonEmpty::from(("sv".to_string(), vec!["status".to_string()]));
        let spec = CommandSpec::from_argv(&argv);
        assert_eq!(spec.program, PathBuf::from("sv"));
        assert_eq!(spec.args, vec!["status".to_string()]);
    }

    #[tokio::test]
    async fn run_checked_reports_non_zero_exit() {
        let runner = SystemRunner::default();
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);

        let err = runner.run_checked("probe", &spec).await.unwrap_err();
        let output = err.output().expect("output should be captured");
        assert_eq!(output.exit_code, 3);
        assert!(output.stderr.contains("boom"));
    }
}
