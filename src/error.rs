// ABOUTME: Application-wide error types for skiff.
// ABOUTME: Wraps each subsystem's error so the binary can report one message.

use crate::deploy::{DeployError, LockError};
use crate::exec::ExecError;
use crate::security::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("aborted")]
    Aborted,

    #[error("remote command failed: {0}")]
    Exec(#[from] ExecError),

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
