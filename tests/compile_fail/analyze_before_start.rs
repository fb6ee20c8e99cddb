// ABOUTME: Compile-fail test verifying analyze cannot run before the database starts.
// ABOUTME: This test should fail to compile, validating state machine safety.

use pg_upgrader::diagnostics::Diagnostics;
use pg_upgrader::process::ProcessRunner;
use pg_upgrader::upgrade::{Migration, Swapped};

async fn try_early_analyze(migration: Migration<Swapped>, runner: &dyn ProcessRunner) {
    let mut diag = Diagnostics::default();

    // ERROR: analyze() doesn't exist on Migration<Swapped>
    migration.analyze(runner, &mut diag).await;
}

fn main() {}
