// ABOUTME: Command module aggregator for the pg-upgrader CLI.
// ABOUTME: Wires the system collaborators and re-exports the command handlers.

mod revert;
mod upgrade;

pub use revert::revert;
pub use upgrade::upgrade;

use pg_upgrader::config::Config;
use pg_upgrader::diagnostics::Diagnostics;
use pg_upgrader::output::Output;
use pg_upgrader::process::{CommandSpec, ProcessRunner, SystemRunner};
use pg_upgrader::services::{
    ClusterRoleDetector, CommandConfigSystem, RepmgrRole, SupervisorControl,
};
use pg_upgrader::upgrade::{Host, Orchestrator};
use std::sync::Arc;

/// Orchestrator backed by the real supervisor, repmgr and reconfigure commands.
fn system_orchestrator(config: Config) -> Orchestrator {
    let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner::new(config.privilege_drop.clone()));

    let host = Host {
        runner: runner.clone(),
        services: Arc::new(SupervisorControl::new(
            runner.clone(),
            config.supervisor.clone(),
        )),
        config_system: Arc::new(CommandConfigSystem::new(
            runner.clone(),
            CommandSpec::from_argv(&config.reconfigure),
        )),
    };

    let role = RepmgrRole::new(
        runner,
        config.ha.repmgr.clone(),
        config.ha.repmgr_config.clone(),
        config.database.user.clone(),
    );
    let cluster = ClusterRoleDetector::new(config.ha.enabled, Arc::new(role));

    Orchestrator::new(config, host, cluster)
}

fn emit_warnings(output: &Output, diag: &Diagnostics) {
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
}
