// ABOUTME: Checks run before a release goes live: required env vars and migrations.
// ABOUTME: Both operate on the remote host through an Executor.

mod env;
mod migration;

pub use env::{
    EnvCheckResult, EnvRequirement, append_line_command, check_env_vars, default_requirements,
    fill_generated, parse_env_file,
};
pub use migration::{
    MIGRATION_WARNING_MARKER, MigrationCheckResult, MigrationLayout, check_migrations,
    is_migration_command, warn_once_if_needed,
};

use crate::exec::ExecError;
use crate::security::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unexpected output from {what}: {output:?}")]
    UnexpectedOutput { what: &'static str, output: String },
}

pub type Result<T> = std::result::Result<T, PreflightError>;
