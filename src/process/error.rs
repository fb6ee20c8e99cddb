// ABOUTME: Error types for external command execution.
// ABOUTME: ProcessError covers launching; ExecutionError carries captured output.

use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

use super::runner::CommandOutput;

/// Failure to run a command at all.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProcessError {
    #[snafu(display("failed to launch {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("{program} did not finish within {}s", timeout.as_secs()))]
    Timeout { program: String, timeout: Duration },
}

/// A step that ran an external command or touched the filesystem and failed.
///
/// Command failures keep the captured stdout/stderr so the operator sees
/// exactly what the native tool printed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{action}: `{command}` exited with status {}", output.exit_code)]
    NonZeroExit {
        action: String,
        command: String,
        output: CommandOutput,
    },

    #[error("{action}: {source}")]
    Process {
        action: String,
        #[source]
        source: ProcessError,
    },

    #[error("{action}: {path}: {source}")]
    Io {
        action: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{action}: {reason}")]
    Failed { action: String, reason: String },
}

impl ExecutionError {
    pub fn io(action: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExecutionError::Io {
            action: action.into(),
            path: path.into(),
            source,
        }
    }

    pub fn failed(action: impl Into<String>, reason: impl Into<String>) -> Self {
        ExecutionError::Failed {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Captured output of the failed command, if a command ran.
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            ExecutionError::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }

    /// The error message followed by whatever the command printed, for
    /// messages that outlive the error itself.
    pub fn report(&self) -> String {
        let mut text = self.to_string();
        if let Some(output) = self.output() {
            for stream in [&output.stdout, &output.stderr] {
                let stream = stream.trim_end();
                if !stream.is_empty() {
                    text.push('\n');
                    text.push_str(stream);
                }
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_appends_captured_streams() {
        let err = ExecutionError::NonZeroExit {
            action: "analyze new cluster".to_string(),
            command: "vacuumdb --all".to_string(),
            output: CommandOutput {
                exit_code: 1,
                stdout: "vacuumdb: processing database \"postgres\"\n".to_string(),
                stderr: "ERROR: out of shared memory\n".to_string(),
            },
        };
        assert_eq!(
            err.report(),
            "analyze new cluster: `vacuumdb --all` exited with status 1\n\
             vacuumdb: processing database \"postgres\"\n\
             ERROR: out of shared memory"
        );
    }

    #[test]
    fn report_without_output_is_the_message() {
        let err = ExecutionError::failed("stop database", "still running");
        assert_eq!(err.report(), "stop database: still running");
    }
}
