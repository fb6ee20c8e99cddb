// ABOUTME: pg-upgrade command implementation.
// ABOUTME: Runs the upgrade with Ctrl-C as the interrupt and reports the outcome.

use super::{emit_warnings, system_orchestrator};
use pg_upgrader::config::Config;
use pg_upgrader::diagnostics::Diagnostics;
use pg_upgrader::error::Result;
use pg_upgrader::output::Output;
use pg_upgrader::upgrade::{UpgradeError, UpgradeOptions, UpgradePhase};

/// Upgrade this node to the newly installed PostgreSQL major version.
pub async fn upgrade(config: Config, options: UpgradeOptions, mut output: Output) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();
    let orchestrator = system_orchestrator(config);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for interrupts");
            std::future::pending::<()>().await;
        }
    };

    let result = orchestrator
        .upgrade(&options, shutdown, &output, &mut diag)
        .await;
    emit_warnings(&output, &diag);

    match result {
        Ok(outcome) => {
            output.success(&format!(
                "Upgraded PostgreSQL {} to {} ({})",
                outcome.from, outcome.to, outcome.instance_type
            ));
            Ok(())
        }
        Err(UpgradeError::Precondition(e)) if e.is_nothing_to_do() => {
            output.success(&e.to_string());
            Ok(())
        }
        Err(e) => {
            if orchestrator.phase() == UpgradePhase::Reverted {
                output.progress("Rolled back to the previous version");
            }
            Err(e.into())
        }
    }
}
