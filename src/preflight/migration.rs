// ABOUTME: Heuristic warning for entity changes shipped without migrations.
// ABOUTME: Counts files inside the candidate container and warns once per app.

use super::{PreflightError, Result};
use crate::exec::Executor;
use crate::security::{ValidationError, shell_escape, validate_relative_path};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// File name of the per-app marker recording that the warning was shown.
pub const MIGRATION_WARNING_MARKER: &str = ".migration-warning";

/// Where entity and migration sources live, relative to the container workdir.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationLayout {
    #[serde(default = "default_entity_dir")]
    pub entity_dir: String,
    #[serde(default = "default_migration_dir")]
    pub migration_dir: String,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for MigrationLayout {
    fn default() -> Self {
        Self {
            entity_dir: default_entity_dir(),
            migration_dir: default_migration_dir(),
            extension: default_extension(),
        }
    }
}

fn default_entity_dir() -> String {
    "src/Entity".to_string()
}

fn default_migration_dir() -> String {
    "migrations".to_string()
}

fn default_extension() -> String {
    "php".to_string()
}

impl MigrationLayout {
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_relative_path(&self.entity_dir)?;
        validate_relative_path(&self.migration_dir)?;
        validate_relative_path(&self.extension)?;
        if self.extension.contains('/') {
            return Err(ValidationError::InvalidChar {
                field: "migration file extension",
                ch: '/',
            });
        }
        Ok(())
    }

    fn count_script(&self) -> String {
        let pattern = shell_escape(&format!("*.{}", self.extension));
        let count = |dir: &str| {
            format!(
                "find {} -type f -name {} 2>/dev/null | wc -l",
                shell_escape(dir),
                pattern
            )
        };
        format!("{}; {}", count(&self.entity_dir), count(&self.migration_dir))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationCheckResult {
    pub migration_file_count: usize,
    pub entity_file_count: usize,
    pub has_potential_problem: bool,
}

impl MigrationCheckResult {
    pub fn new(migration_file_count: usize, entity_file_count: usize) -> Self {
        Self {
            migration_file_count,
            entity_file_count,
            has_potential_problem: entity_file_count > 0 && migration_file_count == 0,
        }
    }
}

/// A hook runs migrations when one of its words ends in `migrate`.
pub fn is_migration_command(hook: &str) -> bool {
    hook.split_whitespace().any(|token| token.ends_with("migrate"))
}

pub async fn check_migrations<E: Executor + ?Sized>(
    executor: &E,
    cancel: &CancellationToken,
    container: &str,
    layout: &MigrationLayout,
) -> Result<MigrationCheckResult> {
    layout.validate()?;
    let command = format!(
        "docker exec {} sh -c {}",
        shell_escape(container),
        shell_escape(&layout.count_script())
    );
    let output = executor.exec_checked(cancel, &command).await?;

    let counts: Vec<usize> = output
        .stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    match counts.as_slice() {
        [entities, migrations] => Ok(MigrationCheckResult::new(*migrations, *entities)),
        _ => Err(PreflightError::UnexpectedOutput {
            what: "migration file count",
            output: output.stdout,
        }),
    }
}

/// Record the warning in `marker_path`; returns true when it should be shown now.
///
/// A clean result removes the marker so a future problem warns again.
pub async fn warn_once_if_needed<E: Executor + ?Sized>(
    executor: &E,
    cancel: &CancellationToken,
    marker_path: &str,
    result: &MigrationCheckResult,
) -> Result<bool> {
    let marker = shell_escape(marker_path);

    if !result.has_potential_problem {
        executor
            .exec_checked(cancel, &format!("rm -f {}", marker))
            .await?;
        return Ok(false);
    }

    let seen = executor.exec(cancel, &format!("test -e {}", marker)).await?;
    if seen.success() {
        return Ok(false);
    }
    executor
        .exec_checked(cancel, &format!("touch {}", marker))
        .await?;
    Ok(true)
}
