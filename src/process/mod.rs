// ABOUTME: Narrow process execution seam for native tools and service CLIs.
// ABOUTME: Every external command flows through ProcessRunner so tests can script it.

mod error;
mod runner;

pub use error::{ExecutionError, ProcessError};
pub use runner::{CommandOutput, CommandSpec, ProcessRunner, SystemRunner};
