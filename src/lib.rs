// ABOUTME: Library root for pg-upgrader - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod maintenance;
pub mod output;
pub mod process;
pub mod services;
pub mod types;
pub mod upgrade;
pub mod versions;
