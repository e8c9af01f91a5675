// ABOUTME: Hooks for deployment lifecycle events.
// ABOUTME: Runs configured commands inside the app container at pre-deploy and post-deploy.

use std::collections::BTreeMap;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::exec::{ExecError, Executor};
use crate::security::{ValidationError, shell_escape, validate_hook};
use crate::types::{AppName, ReleaseTag};

/// Hook execution points in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Against the candidate container, before the swap. Failure aborts deployment.
    PreDeploy,
    /// Against the production container, after the swap. Failure logs a warning.
    PostDeploy,
}

impl HookPoint {
    pub fn name(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostDeploy => "post-deploy",
        }
    }

    /// Whether failure at this hook point should abort deployment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreDeploy)
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub app: AppName,
    pub release: ReleaseTag,
    pub image: String,
    pub server: String,
    pub previous_release: Option<String>,
}

impl HookContext {
    pub fn to_env(&self) -> BTreeMap<&'static str, String> {
        let mut env = BTreeMap::new();
        env.insert("SKIFF_APP", self.app.to_string());
        env.insert("SKIFF_RELEASE", self.release.to_string());
        env.insert("SKIFF_IMAGE", self.image.clone());
        env.insert("SKIFF_SERVER", self.server.clone());
        if let Some(prev) = &self.previous_release {
            env.insert("SKIFF_PREVIOUS_RELEASE", prev.clone());
        }
        env
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

/// `docker exec` command running `hook` in `container` with the context exported.
pub fn hook_command(container: &str, hook: &str, context: &HookContext) -> Result<String, HookError> {
    validate_hook(hook)?;

    let mut command = String::from("docker exec");
    for (key, value) in context.to_env() {
        command.push_str(" -e ");
        command.push_str(&shell_escape(&format!("{}={}", key, value)));
    }
    command.push(' ');
    command.push_str(&shell_escape(container));
    command.push_str(" sh -c ");
    command.push_str(&shell_escape(hook));
    Ok(command)
}

/// Runs hooks through an Executor.
pub struct HookRunner<'a, E: Executor + ?Sized> {
    executor: &'a E,
}

impl<'a, E: Executor + ?Sized> HookRunner<'a, E> {
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        point: HookPoint,
        container: &str,
        hook: &str,
        context: &HookContext,
    ) -> Result<HookResult, HookError> {
        let command = hook_command(container, hook, context)?;
        tracing::info!("running {} hook: {}", point, hook);

        let output = self.executor.exec(cancel, &command).await?;
        let result = HookResult {
            success: output.success(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if result.success {
            tracing::info!("{} hook completed successfully", point);
        } else {
            tracing::warn!("{} hook failed with exit code {}", point, result.exit_code);
        }
        Ok(result)
    }
}
