// ABOUTME: Accumulator for non-fatal problems found during a run.
// ABOUTME: Best-effort steps report here instead of failing the deployment.

use serde::Serialize;

/// Collects non-fatal warnings during a deployment or restore.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn of_kind(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self::new(WarningKind::SshDisconnect, message)
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::BestEffortCleanup, message)
    }

    pub fn rollback(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Rollback, message)
    }

    pub fn post_deploy(message: impl Into<String>) -> Self {
        Self::new(WarningKind::PostDeploy, message)
    }

    pub fn forced(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ForcedContinue, message)
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
    /// Stale temp container removal, release pruning.
    BestEffortCleanup,
    /// Shared tree ownership could not be changed.
    Ownership,
    /// A rollback command failed.
    Rollback,
    /// Post-deploy hook or worker restart failed after the swap.
    PostDeploy,
    Migration,
    /// A failure that `--force` let the run continue past.
    ForcedContinue,
}
