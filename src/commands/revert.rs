// ABOUTME: revert-pg-upgrade command implementation.

use super::{emit_warnings, system_orchestrator};
use pg_upgrader::config::Config;
use pg_upgrader::diagnostics::Diagnostics;
use pg_upgrader::error::Result;
use pg_upgrader::output::Output;
use pg_upgrader::upgrade::{RevertOptions, UpgradeError};

/// Return this node to the previous PostgreSQL major version.
pub async fn revert(config: Config, options: RevertOptions, mut output: Output) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();
    let orchestrator = system_orchestrator(config);

    let result = orchestrator.revert(&options, &output, &mut diag).await;
    emit_warnings(&output, &diag);

    match result {
        Ok(outcome) => {
            output.success(&format!("Reverted to PostgreSQL {}", outcome.to));
            Ok(())
        }
        Err(UpgradeError::Precondition(e)) if e.is_nothing_to_do() => {
            output.success(&e.to_string());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
