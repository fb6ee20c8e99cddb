// ABOUTME: Compile-fail test verifying directories cannot be swapped on Stopped.
// ABOUTME: This test should fail to compile, validating state machine safety.

use pg_upgrader::upgrade::{Migration, Stopped};

fn try_early_swap(migration: Migration<Stopped>) {
    // ERROR: swap_directories() doesn't exist on Migration<Stopped>
    let _ = migration.swap_directories();
}

fn main() {}
