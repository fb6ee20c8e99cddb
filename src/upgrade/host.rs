// ABOUTME: Bundle of collaborator capabilities a run drives.

use std::sync::Arc;

use crate::process::ProcessRunner;
use crate::services::{ConfigSystem, ServiceControl};

/// External capabilities used by migration, rollback and revert.
#[derive(Clone)]
pub struct Host {
    pub runner: Arc<dyn ProcessRunner>,
    pub services: Arc<dyn ServiceControl>,
    pub config_system: Arc<dyn ConfigSystem>,
}
