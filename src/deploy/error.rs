// ABOUTME: Deployment error types with the SNAFU pattern.
// ABOUTME: Each failure carries the phase it happened in for rollback and reporting.

use chrono::{DateTime, Utc};
use snafu::Snafu;
use thiserror::Error;

use crate::exec::ExecError;
use crate::health::HealthError;
use crate::hooks::{HookError, HookPoint};
use crate::preflight::PreflightError;
use crate::security::ValidationError;

use super::state::{DeployPhase, TransitionError};

/// Why a phase could not complete.
#[derive(Debug, Error)]
pub enum PhaseFailure {
    #[error("{step}: {source}")]
    Command {
        step: &'static str,
        #[source]
        source: ExecError,
    },

    #[error("container unhealthy after {attempts} attempts: {message}")]
    Unhealthy { attempts: u32, message: String },

    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("{point} hook `{hook}` exited with code {exit_code}")]
    Hook {
        point: HookPoint,
        hook: String,
        exit_code: u32,
        stderr: String,
    },

    #[error(transparent)]
    HookRun(#[from] HookError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Health(#[from] HealthError),
}

impl PhaseFailure {
    pub fn command(step: &'static str) -> impl FnOnce(ExecError) -> PhaseFailure {
        move |source| PhaseFailure::Command { step, source }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PhaseFailure::Command {
                source: ExecError::Cancelled,
                ..
            } | PhaseFailure::Health(HealthError::Cancelled)
                | PhaseFailure::HookRun(HookError::Exec(ExecError::Cancelled))
                | PhaseFailure::Preflight(PreflightError::Exec(ExecError::Cancelled))
        )
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}; use --force to break it")]
    Held {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("deploy lock error: {0}")]
    Failed(String),

    #[error("deploy lock: {0}")]
    Exec(#[from] ExecError),
}

/// Unified error for deploy and restore runs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeployError {
    #[snafu(display("{phase} failed: {source}"))]
    Phase {
        phase: DeployPhase,
        source: PhaseFailure,
    },

    #[snafu(display("invalid phase transition: {source}"))]
    Transition { source: TransitionError },

    #[snafu(display("deployment cancelled during {phase}"))]
    Cancelled { phase: DeployPhase },

    #[snafu(display("{source}"))]
    Lock { source: LockError },

    #[snafu(display("cannot restore: {reason}"))]
    NoRelease { reason: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    /// A remote command failed or could not be sent.
    Command,
    /// The new container never became healthy.
    Unhealthy,
    /// The operator has to provide environment variables.
    MissingEnv,
    HookFailed,
    InvalidInput,
    Cancelled,
    LockHeld,
    Lock,
    NoRelease,
    Internal,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Phase { source, .. } if source.is_cancelled() => {
                DeployErrorKind::Cancelled
            }
            DeployError::Phase { source, .. } => match source {
                PhaseFailure::Command { .. } => DeployErrorKind::Command,
                PhaseFailure::Unhealthy { .. } => DeployErrorKind::Unhealthy,
                PhaseFailure::MissingEnv(_) => DeployErrorKind::MissingEnv,
                PhaseFailure::Hook { .. } => DeployErrorKind::HookFailed,
                PhaseFailure::HookRun(HookError::Invalid(_)) | PhaseFailure::Validation(_) => {
                    DeployErrorKind::InvalidInput
                }
                PhaseFailure::HookRun(HookError::Exec(_)) | PhaseFailure::Preflight(_) => {
                    DeployErrorKind::Command
                }
                PhaseFailure::Health(HealthError::Cancelled) => DeployErrorKind::Cancelled,
                PhaseFailure::Health(HealthError::NotRunning { .. }) => DeployErrorKind::Unhealthy,
            },
            DeployError::Transition { .. } => DeployErrorKind::Internal,
            DeployError::Cancelled { .. } => DeployErrorKind::Cancelled,
            DeployError::Lock { source } => match source {
                LockError::Held { .. } => DeployErrorKind::LockHeld,
                LockError::Failed(_) | LockError::Exec(_) => DeployErrorKind::Lock,
            },
            DeployError::NoRelease { .. } => DeployErrorKind::NoRelease,
        }
    }

    /// Phase the run was in when it failed, if it got that far.
    pub fn phase(&self) -> Option<DeployPhase> {
        match self {
            DeployError::Phase { phase, .. } | DeployError::Cancelled { phase } => Some(*phase),
            DeployError::Transition { source } => Some(source.from),
            DeployError::Lock { .. } | DeployError::NoRelease { .. } => None,
        }
    }
}

impl From<LockError> for DeployError {
    fn from(source: LockError) -> Self {
        DeployError::Lock { source }
    }
}

impl From<TransitionError> for DeployError {
    fn from(source: TransitionError) -> Self {
        DeployError::Transition { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandError;

    #[test]
    fn kind_classifies_phase_failures() {
        let err = DeployError::Phase {
            phase: DeployPhase::HealthCheck,
            source: PhaseFailure::Unhealthy {
                attempts: 5,
                message: "HTTP 502".to_string(),
            },
        };
        assert_eq!(err.kind(), DeployErrorKind::Unhealthy);
        assert_eq!(err.phase(), Some(DeployPhase::HealthCheck));
        assert_eq!(
            err.to_string(),
            "health-check failed: container unhealthy after 5 attempts: HTTP 502"
        );
    }

    #[test]
    fn cancelled_command_is_cancelled_kind() {
        let err = DeployError::Phase {
            phase: DeployPhase::StartNewContainer,
            source: PhaseFailure::command("docker pull")(ExecError::Cancelled),
        };
        assert_eq!(err.kind(), DeployErrorKind::Cancelled);
    }

    #[test]
    fn failed_command_display_names_step() {
        let failure = PhaseFailure::command("docker run")(ExecError::Failed(CommandError {
            exit_code: 125,
            stderr: "name in use".to_string(),
        }));
        assert_eq!(
            failure.to_string(),
            "docker run: command exited with code 125: name in use"
        );
    }

    #[test]
    fn missing_env_lists_names() {
        let failure = PhaseFailure::MissingEnv(vec!["DATABASE_URL".into(), "MAILER_DSN".into()]);
        assert_eq!(
            failure.to_string(),
            "missing required environment variables: DATABASE_URL, MAILER_DSN"
        );
    }

    #[test]
    fn lock_held_kind() {
        let err = DeployError::from(LockError::Held {
            holder: "ci".to_string(),
            pid: 7,
            started_at: Utc::now(),
        });
        assert_eq!(err.kind(), DeployErrorKind::LockHeld);
        assert_eq!(err.phase(), None);
    }
}
