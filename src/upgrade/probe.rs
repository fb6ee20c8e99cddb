// ABOUTME: Bounded liveness wait for the database after it is started.

use std::time::Duration;

use super::context::DirectoryPaths;
use crate::config::{DatabaseConfig, TimeoutsConfig};
use crate::process::{CommandSpec, ExecutionError, ProcessRunner};

/// Poll `pg_isready` from `major`'s binaries until the server accepts
/// connections, at most `timeouts.start_attempts` times.
pub async fn wait_until_ready(
    runner: &dyn ProcessRunner,
    paths: &DirectoryPaths,
    major: u32,
    database: &DatabaseConfig,
    timeouts: &TimeoutsConfig,
) -> Result<(), ExecutionError> {
    let spec = CommandSpec::new(paths.version_bin_dir(major).join("pg_isready"))
        .arg("-h")
        .arg(database.host.display().to_string())
        .arg("-p")
        .arg(database.port.to_string())
        .run_as(&database.user)
        .timeout(Duration::from_secs(10));

    let attempts = timeouts.start_attempts;
    let action = format!(
        "{} did not accept connections after {attempts} attempts",
        database.service
    );

    // The last failed attempt is reported with whatever pg_isready printed.
    let mut last = ExecutionError::failed("wait for database", action.clone());
    for attempt in 1..=attempts {
        match runner.run(&spec).await {
            Ok(output) if output.success() => {
                tracing::info!(attempt, "database is accepting connections");
                return Ok(());
            }
            Ok(output) => {
                tracing::debug!(attempt, exit_code = output.exit_code, "database not ready yet");
                last = ExecutionError::NonZeroExit {
                    action: action.clone(),
                    command: spec.to_string(),
                    output,
                };
            }
            Err(source) => {
                tracing::debug!(attempt, error = %source, "liveness probe failed");
                last = ExecutionError::Process {
                    action: action.clone(),
                    source,
                };
            }
        }

        if attempt < attempts {
            tokio::time::sleep(timeouts.start_interval).await;
        }
    }

    Err(last)
}
