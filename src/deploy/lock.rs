// ABOUTME: Deploy lock preventing concurrent runs against the same app on a host.
// ABOUTME: Uses atomic noclobber file creation with holder info stored as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::exec::Executor;
use crate::security::shell_escape;
use crate::types::AppName;

use super::commands;
use super::error::LockError;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub app: String,
}

impl LockInfo {
    /// Lock info for the current process.
    pub fn new(app: &AppName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            app: app.to_string(),
        }
    }

    /// Locks older than an hour are assumed abandoned.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

/// A held deploy lock. Release it explicitly with [`DeployLock::release`].
pub struct DeployLock<'a, E: Executor + ?Sized> {
    executor: &'a E,
    path: String,
}

impl<E: Executor + ?Sized> std::fmt::Debug for DeployLock<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock").field("path", &self.path).finish()
    }
}

/// Exits non-zero when the file already exists.
fn acquire_command(path: &str, info: &LockInfo) -> Result<String, LockError> {
    let json = serde_json::to_string(info)
        .map_err(|e| LockError::Failed(format!("failed to serialize lock: {}", e)))?;
    Ok(format!(
        "(set -C; echo {} > {}) 2>/dev/null",
        shell_escape(&json),
        shell_escape(path)
    ))
}

impl<'a, E: Executor + ?Sized> DeployLock<'a, E> {
    /// Acquire the lock at `path`, creating its directory first.
    ///
    /// Stale (over an hour) and unreadable locks are broken with a warning;
    /// a live lock is only broken when `force` is set.
    pub async fn acquire(
        executor: &'a E,
        cancel: &CancellationToken,
        app: &AppName,
        path: &str,
        force: bool,
    ) -> Result<Self, LockError> {
        if let Some((dir, _)) = path.rsplit_once('/')
            && !dir.is_empty()
        {
            executor
                .exec_checked(cancel, &commands::mkdir_p(&[dir.to_string()]))
                .await?;
        }

        let acquire = acquire_command(path, &LockInfo::new(app))?;
        if executor.exec(cancel, &acquire).await?.success() {
            tracing::debug!(path, "deploy lock acquired");
            return Ok(Self {
                executor,
                path: path.to_string(),
            });
        }

        let existing = executor.exec(cancel, &commands::read_file(path)).await?;
        let holder = existing
            .success()
            .then(|| serde_json::from_str::<LockInfo>(existing.stdout.trim()).ok())
            .flatten();

        match holder {
            Some(info) if force => tracing::warn!(
                "breaking lock held by {} (pid {}) since {}",
                info.holder,
                info.pid,
                info.started_at
            ),
            Some(info) if info.is_stale() => tracing::warn!(
                "auto-breaking stale lock held by {} (pid {}) since {}",
                info.holder,
                info.pid,
                info.started_at
            ),
            Some(info) => {
                return Err(LockError::Held {
                    holder: info.holder,
                    pid: info.pid,
                    started_at: info.started_at,
                });
            }
            None => tracing::warn!(path, "lock info unreadable, breaking lock"),
        }

        executor
            .exec_checked(cancel, &format!("rm -f {}", shell_escape(path)))
            .await?;

        if !executor.exec(cancel, &acquire).await?.success() {
            return Err(LockError::Failed(
                "lock acquired by another process during break".to_string(),
            ));
        }

        Ok(Self {
            executor,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Remove the lock file. Runs even when the run itself was cancelled.
    pub async fn release(self) -> Result<(), LockError> {
        self.executor
            .exec_checked(
                &CancellationToken::new(),
                &format!("rm -f {}", shell_escape(&self.path)),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecResult, RecordingExecutor};

    const PATH: &str = "/opt/skiff/apps/shop/.deploy.lock";

    fn app() -> AppName {
        AppName::new("shop").unwrap()
    }

    fn held_by(minutes_ago: i64) -> String {
        let mut info = LockInfo::new(&app());
        info.holder = "ci-runner".to_string();
        info.pid = 4242;
        info.started_at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        serde_json::to_string(&info).unwrap()
    }

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new(&app());
        assert_eq!(info.app, "shop");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
        assert!(!info.is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new(&app());
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }

    #[tokio::test]
    async fn acquire_and_release_free_lock() {
        let exec = RecordingExecutor::new();
        let cancel = CancellationToken::new();

        let lock = DeployLock::acquire(&exec, &cancel, &app(), PATH, false)
            .await
            .unwrap();
        lock.release().await.unwrap();

        let commands = exec.commands();
        assert_eq!(commands[0], "mkdir -p '/opt/skiff/apps/shop'");
        assert!(commands[1].starts_with("(set -C; echo '{"));
        assert_eq!(commands.last().unwrap(), &format!("rm -f '{}'", PATH));
    }

    #[tokio::test]
    async fn live_lock_is_reported() {
        let exec = RecordingExecutor::new();
        exec.on("set -C", ExecResult::failed(1, ""));
        exec.on("cat ", ExecResult::ok(held_by(5)));

        let err = DeployLock::acquire(&exec, &CancellationToken::new(), &app(), PATH, false)
            .await
            .unwrap_err();
        match err {
            LockError::Held { holder, pid, .. } => {
                assert_eq!(holder, "ci-runner");
                assert_eq!(pid, 4242);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(exec.commands_containing("rm -f").is_empty());
    }

    #[tokio::test]
    async fn force_breaks_live_lock() {
        let exec = RecordingExecutor::new();
        exec.once("set -C", ExecResult::failed(1, ""));
        exec.on("cat ", ExecResult::ok(held_by(5)));

        let lock = DeployLock::acquire(&exec, &CancellationToken::new(), &app(), PATH, true).await;
        assert!(lock.is_ok());
        assert_eq!(exec.commands_containing("set -C").len(), 2);
        assert_eq!(exec.commands_containing("rm -f").len(), 1);
    }

    #[tokio::test]
    async fn stale_and_corrupt_locks_are_broken() {
        for content in [held_by(120), "not json".to_string()] {
            let exec = RecordingExecutor::new();
            exec.once("set -C", ExecResult::failed(1, ""));
            exec.on("cat ", ExecResult::ok(content));

            let lock =
                DeployLock::acquire(&exec, &CancellationToken::new(), &app(), PATH, false).await;
            assert!(lock.is_ok());
        }
    }

    #[tokio::test]
    async fn lost_race_after_break_fails() {
        let exec = RecordingExecutor::new();
        exec.on("set -C", ExecResult::failed(1, ""));
        exec.on("cat ", ExecResult::ok(held_by(120)));

        let err = DeployLock::acquire(&exec, &CancellationToken::new(), &app(), PATH, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Failed(_)));
    }
}
