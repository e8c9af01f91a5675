// ABOUTME: Command execution abstraction over a remote shell.
// ABOUTME: Defines the Executor trait, command results and execution errors.

mod recording;
mod remote;

pub use recording::RecordingExecutor;
pub use remote::{DEFAULT_COMMAND_TIMEOUT, RemoteExecutor};

use crate::ssh;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Captured output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: u32,
}

impl ExecResult {
    /// Successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    /// Failed result with the given exit code and stderr.
    pub fn failed(exit_code: u32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// `Some` exactly when the command exited non-zero.
    pub fn error(&self) -> Option<CommandError> {
        (self.exit_code != 0).then(|| CommandError {
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        })
    }

    pub fn into_result(self) -> Result<Self, CommandError> {
        match self.error() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// A remote command ran but exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CommandError {
    pub exit_code: u32,
    pub stderr: String,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command exited with code {}", self.exit_code)?;
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("operation cancelled")]
    Cancelled,

    /// Only produced by [`Executor::exec_checked`].
    #[error(transparent)]
    Failed(#[from] CommandError),

    #[error(transparent)]
    Transport(#[from] ssh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<russh::Error> for ExecError {
    fn from(e: russh::Error) -> Self {
        ExecError::Transport(ssh::Error::Protocol(e))
    }
}

/// How a streamed command is attached to the local terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Output only, no PTY (log tails).
    Follow,
    /// PTY allocated and local stdin forwarded (shells).
    Interactive,
}

/// Runs shell commands on a target. Implementations never validate input.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a command to completion and capture its output.
    async fn exec(&self, cancel: &CancellationToken, command: &str)
    -> Result<ExecResult, ExecError>;

    /// Run a command attached to the local terminal; returns its exit code.
    async fn exec_stream(
        &self,
        cancel: &CancellationToken,
        command: &str,
        mode: StreamMode,
    ) -> Result<u32, ExecError>;

    /// Release the underlying transport. Idempotent.
    async fn close(&self) -> Result<(), ExecError>;

    /// Like [`Executor::exec`], but a non-zero exit becomes [`ExecError::Failed`].
    async fn exec_checked(
        &self,
        cancel: &CancellationToken,
        command: &str,
    ) -> Result<ExecResult, ExecError> {
        Ok(self.exec(cancel, command).await?.into_result()?)
    }
}
