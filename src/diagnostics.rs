// ABOUTME: Diagnostics accumulator for non-fatal warnings during an upgrade or revert.
// ABOUTME: Collects follow-ups that shouldn't fail the run but must be shown to the operator.

/// Collects non-fatal warnings during upgrade operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether a warning of the given kind was recorded.
    pub fn contains(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Statistics refresh failed on the upgraded cluster.
    pub fn analyze_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::AnalyzeFailed,
            message: message.into(),
        }
    }

    /// Binaries were reverted but the preserved data directory was missing.
    pub fn data_not_reverted(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::DataNotReverted,
            message: message.into(),
        }
    }

    /// A secondary needs manual re-seeding or re-registration.
    pub fn secondary_follow_up(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SecondaryFollowUp,
            message: message.into(),
        }
    }

    /// Maintenance mode could not stop or restart a service or the deploy page.
    pub fn maintenance(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Maintenance,
            message: message.into(),
        }
    }

    /// Configuration regeneration after the database came up failed.
    pub fn reconfigure_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Reconfigure,
            message: message.into(),
        }
    }

    /// A stale run lock was broken.
    pub fn stale_lock(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StaleLock,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    AnalyzeFailed,
    DataNotReverted,
    SecondaryFollowUp,
    Maintenance,
    Reconfigure,
    StaleLock,
}
