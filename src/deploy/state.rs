// ABOUTME: Deployment phases and the forward-only state of one deployment attempt.
// ABOUTME: Rollback decisions are derived from the phase recorded here.

use std::fmt;

use thiserror::Error;

use crate::types::AppName;

/// Phases of a blue-green deployment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeployPhase {
    Init,
    PrepareRelease,
    StartNewContainer,
    PreDeployHooks,
    HealthCheck,
    SwapContainers,
    PostDeployHooks,
    Cleanup,
    Done,
}

impl DeployPhase {
    pub const ALL: [DeployPhase; 9] = [
        DeployPhase::Init,
        DeployPhase::PrepareRelease,
        DeployPhase::StartNewContainer,
        DeployPhase::PreDeployHooks,
        DeployPhase::HealthCheck,
        DeployPhase::SwapContainers,
        DeployPhase::PostDeployHooks,
        DeployPhase::Cleanup,
        DeployPhase::Done,
    ];

    pub fn next(self) -> Option<DeployPhase> {
        match self {
            DeployPhase::Init => Some(DeployPhase::PrepareRelease),
            DeployPhase::PrepareRelease => Some(DeployPhase::StartNewContainer),
            DeployPhase::StartNewContainer => Some(DeployPhase::PreDeployHooks),
            DeployPhase::PreDeployHooks => Some(DeployPhase::HealthCheck),
            DeployPhase::HealthCheck => Some(DeployPhase::SwapContainers),
            DeployPhase::SwapContainers => Some(DeployPhase::PostDeployHooks),
            DeployPhase::PostDeployHooks => Some(DeployPhase::Cleanup),
            DeployPhase::Cleanup => Some(DeployPhase::Done),
            DeployPhase::Done => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeployPhase::Init => "init",
            DeployPhase::PrepareRelease => "prepare-release",
            DeployPhase::StartNewContainer => "start-new-container",
            DeployPhase::PreDeployHooks => "pre-deploy-hooks",
            DeployPhase::HealthCheck => "health-check",
            DeployPhase::SwapContainers => "swap-containers",
            DeployPhase::PostDeployHooks => "post-deploy-hooks",
            DeployPhase::Cleanup => "cleanup",
            DeployPhase::Done => "done",
        }
    }

    /// Failures up to and including the swap are undone; later ones are
    /// only reported because the new release is already live.
    pub fn rolls_back_on_failure(self) -> bool {
        self <= DeployPhase::SwapContainers
    }

    /// Failures that `--force` may downgrade to warnings.
    pub fn is_forcible(self) -> bool {
        matches!(self, DeployPhase::PreDeployHooks | DeployPhase::HealthCheck)
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: DeployPhase,
    pub to: DeployPhase,
}

/// State of one deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployState {
    phase: DeployPhase,
    pub app_name: AppName,
    pub temp_container_name: String,
    pub old_container_exists: bool,
}

impl DeployState {
    pub fn new(app: &AppName) -> Self {
        Self {
            phase: DeployPhase::Init,
            app_name: app.clone(),
            temp_container_name: app.temp_container(),
            old_container_exists: false,
        }
    }

    pub fn phase(&self) -> DeployPhase {
        self.phase
    }

    /// Move to `to`, which must be the immediate successor of the current phase.
    pub fn advance(&mut self, to: DeployPhase) -> Result<(), TransitionError> {
        if self.phase.next() != Some(to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }
        tracing::debug!(from = %self.phase, to = %to, "phase transition");
        self.phase = to;
        Ok(())
    }

    pub fn production_container(&self) -> &str {
        self.app_name.as_str()
    }
}
