// ABOUTME: Compile-fail test verifying pg_upgrade cannot run before initdb.
// ABOUTME: This test should fail to compile, validating state machine safety.

use pg_upgrader::process::ProcessRunner;
use pg_upgrader::upgrade::{Migration, Staged};

async fn try_migrate_uninitialized(migration: Migration<Staged>, runner: &dyn ProcessRunner) {
    // ERROR: migrate_data() doesn't exist on Migration<Staged>
    let _ = migration.migrate_data(runner).await;
}

fn main() {}
