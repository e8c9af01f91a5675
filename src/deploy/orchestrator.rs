// ABOUTME: Runs the blue-green phase pipeline against one host through an Executor.
// ABOUTME: Deploys new releases, restores older ones and undoes attempts that fail up to the swap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning, WarningKind};
use crate::exec::{ExecError, ExecResult, Executor};
use crate::health::{HealthChecker, HealthResult};
use crate::hooks::{HookContext, HookPoint, HookRunner};
use crate::preflight::{
    check_env_vars, check_migrations, default_requirements, fill_generated,
    is_migration_command, warn_once_if_needed,
};
use crate::security::{validate_hook, validate_relative_path};
use crate::types::ReleaseTag;

use super::commands::{self, RunSpec};
use super::error::{DeployError, PhaseFailure};
use super::layout::{ContainerNames, RemoteLayout};
use super::lock::DeployLock;
use super::rollback::{rollback_actions, stop_and_remove};
use super::state::{DeployPhase, DeployState};

type PhaseResult = Result<(), PhaseFailure>;

/// Flags threaded from the command line into a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip interactive confirmations.
    pub yes: bool,
    /// Continue past failed pre-deploy hooks and health checks, and break
    /// a live deploy lock.
    pub force: bool,
}

impl RunOptions {
    pub fn yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Persisted next to each release so it can be restored later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMarker {
    pub release: String,
    pub image: String,
    pub deployed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_release: Option<String>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub release: String,
    pub image: String,
    pub previous_release: Option<String>,
    #[serde(serialize_with = "serialize_phase")]
    pub final_phase: DeployPhase,
    pub healthy: Option<bool>,
    pub health_attempts: Option<u32>,
    pub pruned: Vec<String>,
    pub warnings: Vec<Warning>,
}

fn serialize_phase<S: serde::Serializer>(phase: &DeployPhase, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(phase.name())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Deploy,
    /// Re-activate an existing release: no pull, no hooks, no new marker.
    Restore,
}

/// Mutable state of one pipeline run.
struct Run {
    mode: Mode,
    state: DeployState,
    release: ReleaseTag,
    image: String,
    previous_release: Option<String>,
    health: Option<HealthResult>,
    /// Set once the candidate carries the production name.
    candidate_renamed: bool,
    pruned: Vec<String>,
    diagnostics: Diagnostics,
}

impl Run {
    fn into_report(self) -> DeployReport {
        DeployReport {
            release: self.release.to_string(),
            image: self.image,
            previous_release: self.previous_release,
            final_phase: self.state.phase(),
            healthy: self.health.as_ref().map(|h| h.healthy),
            health_attempts: self.health.as_ref().map(|h| h.attempts),
            pruned: self.pruned,
            warnings: self.diagnostics.into_warnings(),
        }
    }
}

type PhaseCallback = Box<dyn Fn(DeployPhase) + Send + Sync>;

/// Drives deployments of one app on one server.
pub struct Deployer<'a, E: Executor + ?Sized> {
    executor: &'a E,
    config: &'a Config,
    server: String,
    options: RunOptions,
    cancel: CancellationToken,
    layout: RemoteLayout,
    names: ContainerNames,
    on_phase: Option<PhaseCallback>,
}

impl<'a, E: Executor + ?Sized> Deployer<'a, E> {
    pub fn new(executor: &'a E, config: &'a Config, server: impl Into<String>) -> Self {
        Self {
            executor,
            config,
            server: server.into(),
            options: RunOptions::default(),
            cancel: CancellationToken::new(),
            layout: RemoteLayout::new(&config.base_dir, &config.app),
            names: ContainerNames::new(&config.app),
            on_phase: None,
        }
    }

    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called as each phase starts.
    pub fn on_phase(mut self, callback: impl Fn(DeployPhase) + Send + Sync + 'static) -> Self {
        self.on_phase = Some(Box::new(callback));
        self
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    pub fn names(&self) -> &ContainerNames {
        &self.names
    }

    /// Deploy `image` as a new release named `release`.
    pub async fn deploy(
        &self,
        release: ReleaseTag,
        image: &str,
    ) -> Result<DeployReport, DeployError> {
        let lock = self.lock().await?;
        let run = self.new_run(Mode::Deploy, release, image.to_string());
        let outcome = self.execute(run).await;
        self.unlock(lock, outcome).await
    }

    /// Re-activate an existing release; `None` picks the one before `current`.
    pub async fn restore(
        &self,
        target: Option<ReleaseTag>,
    ) -> Result<DeployReport, DeployError> {
        let lock = self.lock().await?;
        let outcome = match self.resolve_restore_target(target).await {
            Ok((release, image)) => self.execute(self.new_run(Mode::Restore, release, image)).await,
            Err(e) => Err(e),
        };
        self.unlock(lock, outcome).await
    }

    /// Release tags on the host, newest first, and the one `current` points at.
    pub async fn releases(&self) -> Result<(Vec<String>, Option<String>), ExecError> {
        let listing = self
            .executor
            .exec_checked(&self.cancel, &commands::list_by_mtime(&self.layout.releases_dir()))
            .await?;
        let releases = listing
            .stdout
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Ok((releases, self.current_release().await?))
    }

    async fn current_release(&self) -> Result<Option<String>, ExecError> {
        let link = self
            .executor
            .exec_checked(&self.cancel, &commands::read_link(&self.layout.current_link()))
            .await?;
        Ok(link
            .stdout
            .trim()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }

    fn new_run(&self, mode: Mode, release: ReleaseTag, image: String) -> Run {
        Run {
            mode,
            state: DeployState::new(&self.config.app),
            release,
            image,
            previous_release: None,
            health: None,
            candidate_renamed: false,
            pruned: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    async fn lock(&self) -> Result<DeployLock<'a, E>, DeployError> {
        Ok(DeployLock::acquire(
            self.executor,
            &self.cancel,
            &self.config.app,
            &self.layout.lock_file(),
            self.options.force,
        )
        .await?)
    }

    async fn unlock(
        &self,
        lock: DeployLock<'a, E>,
        outcome: Result<DeployReport, DeployError>,
    ) -> Result<DeployReport, DeployError> {
        let released = lock.release().await;
        match (outcome, released) {
            (Ok(mut report), Err(e)) => {
                let warning = Warning::lock_release(format!("failed to release deploy lock: {}", e));
                tracing::warn!("{}", warning);
                report.warnings.push(warning);
                Ok(report)
            }
            (Err(err), Err(e)) => {
                tracing::warn!(error = %e, "failed to release deploy lock");
                Err(err)
            }
            (outcome, Ok(())) => outcome,
        }
    }

    async fn resolve_restore_target(
        &self,
        target: Option<ReleaseTag>,
    ) -> Result<(ReleaseTag, String), DeployError> {
        let no_release = |reason: String| DeployError::NoRelease { reason };
        let (releases, current) = self
            .releases()
            .await
            .map_err(|e| no_release(format!("cannot list releases: {}", e)))?;

        let release = match target {
            Some(tag) => {
                if !releases.iter().any(|r| r == tag.as_str()) {
                    return Err(no_release(format!("release {} does not exist", tag)));
                }
                if current.as_deref() == Some(tag.as_str()) {
                    return Err(no_release(format!("release {} is already current", tag)));
                }
                tag
            }
            None => {
                let current = current.ok_or_else(|| no_release("no current release".to_string()))?;
                let older = releases
                    .iter()
                    .skip_while(|r| **r != current)
                    .nth(1)
                    .ok_or_else(|| no_release(format!("no release older than {}", current)))?;
                ReleaseTag::new(older)
                    .map_err(|e| no_release(format!("invalid release directory {}: {}", older, e)))?
            }
        };

        let marker = self
            .executor
            .exec_checked(&self.cancel, &commands::read_file(&self.layout.release_marker(&release)))
            .await
            .map_err(|e| no_release(format!("cannot read marker of {}: {}", release, e)))?;
        let marker: ReleaseMarker = serde_json::from_str(marker.stdout.trim())
            .map_err(|e| no_release(format!("corrupt marker for {}: {}", release, e)))?;

        tracing::info!(release = %release, image = %marker.image, "restoring release");
        Ok((release, marker.image))
    }

    async fn execute(&self, mut run: Run) -> Result<DeployReport, DeployError> {
        match self.pipeline(&mut run).await {
            Ok(()) => Ok(run.into_report()),
            Err(err) => {
                self.handle_failure(&mut run, &err).await;
                Err(err)
            }
        }
    }

    async fn pipeline(&self, run: &mut Run) -> Result<(), DeployError> {
        loop {
            let phase = run.state.phase();
            let Some(next) = phase.next() else {
                return Ok(());
            };
            if self.cancel.is_cancelled() {
                return Err(DeployError::Cancelled { phase });
            }

            tracing::info!(phase = %phase, release = %run.release, "starting phase");
            if let Some(callback) = &self.on_phase {
                callback(phase);
            }

            match self.run_phase(phase, run).await {
                Ok(()) => {}
                Err(failure) if failure.is_cancelled() => {
                    return Err(DeployError::Cancelled { phase });
                }
                Err(failure) if self.options.force && phase.is_forcible() => {
                    run.diagnostics.warn(Warning::forced(format!(
                        "{} failed, continuing because of --force: {}",
                        phase, failure
                    )));
                }
                Err(source) => return Err(DeployError::Phase { phase, source }),
            }

            run.state.advance(next)?;
        }
    }

    async fn run_phase(&self, phase: DeployPhase, run: &mut Run) -> PhaseResult {
        match phase {
            DeployPhase::Init => self.init(run).await,
            DeployPhase::PrepareRelease => self.prepare_release(run).await,
            DeployPhase::StartNewContainer => self.start_new_container(run).await,
            DeployPhase::PreDeployHooks => self.pre_deploy_hooks(run).await,
            DeployPhase::HealthCheck => self.health_check(run).await,
            DeployPhase::SwapContainers => self.swap_containers(run).await,
            DeployPhase::PostDeployHooks => self.post_deploy(run).await,
            DeployPhase::Cleanup => self.cleanup(run).await,
            DeployPhase::Done => Ok(()),
        }
    }

    async fn handle_failure(&self, run: &mut Run, err: &DeployError) {
        let phase = run.state.phase();
        if !phase.rolls_back_on_failure() {
            run.diagnostics.warn(Warning::rollback(format!(
                "{} failed after the swap; not rolled back, use `skiff rollback` to restore an older release",
                phase
            )));
            return;
        }

        let mut actions = rollback_actions(&run.state);
        if phase == DeployPhase::SwapContainers && !run.candidate_renamed {
            // The candidate still runs under its temporary name.
            let mut temp = stop_and_remove(&run.state.temp_container_name);
            temp.append(&mut actions);
            actions = temp;
        }
        if actions.is_empty() {
            return;
        }
        tracing::info!(phase = %phase, error = %err, "rolling back failed attempt");

        // The run token may be cancelled already; rollback must still go out.
        let cancel = CancellationToken::new();
        for action in actions {
            match self.executor.exec(&cancel, &action.command()).await {
                Ok(result) if result.success() => {}
                Ok(result) => run.diagnostics.warn(Warning::rollback(format!(
                    "rollback of {} failed: {}",
                    action.container(),
                    result.error().map(|e| e.to_string()).unwrap_or_default()
                ))),
                Err(e) => run.diagnostics.warn(Warning::rollback(format!(
                    "rollback of {} failed: {}",
                    action.container(),
                    e
                ))),
            }
        }
    }

    async fn checked(&self, step: &'static str, command: &str) -> Result<ExecResult, PhaseFailure> {
        self.executor
            .exec_checked(&self.cancel, command)
            .await
            .map_err(PhaseFailure::command(step))
    }

    /// Run a command whose failure only warrants a warning.
    async fn best_effort(
        &self,
        run: &mut Run,
        kind: WarningKind,
        what: &str,
        command: &str,
    ) -> PhaseResult {
        match self.executor.exec_checked(&self.cancel, command).await {
            Ok(_) => Ok(()),
            Err(ExecError::Cancelled) => Err(PhaseFailure::command("cancelled")(ExecError::Cancelled)),
            Err(e) => {
                run.diagnostics.warn(Warning::new(kind, format!("{}: {}", what, e)));
                Ok(())
            }
        }
    }

    fn hook_context(&self, run: &Run) -> HookContext {
        HookContext {
            app: self.config.app.clone(),
            release: run.release.clone(),
            image: run.image.clone(),
            server: self.server.clone(),
            previous_release: run.previous_release.clone(),
        }
    }

    async fn init(&self, run: &mut Run) -> PhaseResult {
        let listing = self.checked("list containers", &commands::list_containers()).await?;
        let existing: Vec<&str> = listing.stdout.lines().map(str::trim).collect();

        run.state.old_container_exists = existing.contains(&self.names.production.as_str());
        if existing.contains(&run.state.temp_container_name.as_str()) {
            let remove = commands::remove_container(&run.state.temp_container_name);
            self.best_effort(run, WarningKind::BestEffortCleanup, "stale temp container", &remove)
                .await?;
        }

        run.previous_release = self
            .current_release()
            .await
            .map_err(PhaseFailure::command("read current release"))?;
        tracing::debug!(
            old_container = run.state.old_container_exists,
            previous = ?run.previous_release,
            "detected existing deployment"
        );
        Ok(())
    }

    async fn prepare_release(&self, run: &mut Run) -> PhaseResult {
        let shared = &self.config.shared;
        let files: Vec<&String> = shared
            .files
            .iter()
            .chain(std::iter::once(&self.config.env_file))
            .collect();

        let mut dirs = vec![self.layout.release_dir(&run.release), self.layout.shared_dir()];
        for dir in &shared.dirs {
            validate_relative_path(dir)?;
            dirs.push(self.layout.shared_path(dir));
        }
        for file in &files {
            validate_relative_path(file)?;
            if let Some((parent, _)) = file.rsplit_once('/') {
                dirs.push(self.layout.shared_path(parent));
            }
        }
        self.checked("create release directories", &commands::mkdir_p(&dirs))
            .await?;

        for file in &files {
            self.checked(
                "create shared file",
                &commands::touch_if_absent(&self.layout.shared_path(file)),
            )
            .await?;
        }

        let env_path = self.layout.env_file(&self.config.env_file);
        let mut requirements = default_requirements(self.config.database_external());
        requirements.extend(self.config.required_env.iter().cloned());
        let checked = check_env_vars(self.executor, &self.cancel, &env_path, &requirements).await?;
        if !checked.is_complete() {
            let unresolved = fill_generated(self.executor, &self.cancel, &env_path, &checked).await?;
            if !unresolved.is_empty() {
                return Err(PhaseFailure::MissingEnv(
                    unresolved.into_iter().map(|r| r.name).collect(),
                ));
            }
        }

        if let Some(user) = &self.config.container_user {
            let chown = commands::chown_recursive(user, &self.layout.shared_dir());
            self.best_effort(run, WarningKind::Ownership, "could not change shared ownership", &chown)
                .await?;
        }

        self.checked("ensure network", &commands::ensure_network(&self.config.network))
            .await?;
        Ok(())
    }

    fn run_spec(&self, name: &str, image: &str, release: &ReleaseTag) -> RunSpec {
        let app_root = self.config.app_root.trim_end_matches('/');
        let shared = &self.config.shared;
        let mut spec = RunSpec::new(name, image, self.config.network.as_str())
            .env_file(self.layout.env_file(&self.config.env_file))
            .label("skiff.app", self.config.app.as_str())
            .label("skiff.release", release.as_str())
            .user(self.config.container_user.clone());
        for path in shared.dirs.iter().chain(&shared.files) {
            let path = path.trim_end_matches('/');
            spec = spec.mount(self.layout.shared_path(path), format!("{}/{}", app_root, path));
        }
        spec
    }

    async fn start_new_container(&self, run: &mut Run) -> PhaseResult {
        if run.mode == Mode::Deploy {
            self.checked("pull image", &commands::pull_image(&run.image)).await?;
        }
        let spec = self.run_spec(&run.state.temp_container_name, &run.image, &run.release);
        self.checked("start new container", &spec.to_command()).await?;
        Ok(())
    }

    async fn pre_deploy_hooks(&self, run: &mut Run) -> PhaseResult {
        if run.mode == Mode::Restore || self.config.hooks.pre_deploy.is_empty() {
            return Ok(());
        }

        let temp = run.state.temp_container_name.clone();
        let health = &self.config.healthcheck;
        HealthChecker::new(self.executor, health.clone())
            .wait_for_container(&self.cancel, &temp, health.timeout, health.interval)
            .await?;

        let context = self.hook_context(run);
        let runner = HookRunner::new(self.executor);
        for hook in &self.config.hooks.pre_deploy {
            validate_hook(hook)?;
            let result = runner
                .run(&self.cancel, HookPoint::PreDeploy, &temp, hook, &context)
                .await?;
            if !result.success {
                return Err(PhaseFailure::Hook {
                    point: HookPoint::PreDeploy,
                    hook: hook.clone(),
                    exit_code: result.exit_code,
                    stderr: result.stderr.trim().to_string(),
                });
            }
            if is_migration_command(hook) {
                self.migration_advisory(run, &temp).await;
            }
        }
        Ok(())
    }

    /// Warn once when entities exist without any migrations. Never fails the run.
    async fn migration_advisory(&self, run: &mut Run, container: &str) {
        let marker = self.layout.migration_marker();
        let checked =
            match check_migrations(self.executor, &self.cancel, container, &self.config.migrations)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::debug!(error = %e, "migration check skipped");
                    return;
                }
            };
        match warn_once_if_needed(self.executor, &self.cancel, &marker, &checked).await {
            Ok(true) => run.diagnostics.warn(Warning::new(
                WarningKind::Migration,
                format!(
                    "{} entity files but no migration files found; schema changes may not be applied",
                    checked.entity_file_count
                ),
            )),
            Ok(false) => {}
            Err(e) => tracing::debug!(error = %e, "migration warning marker not updated"),
        }
    }

    async fn health_check(&self, run: &mut Run) -> PhaseResult {
        let result = HealthChecker::new(self.executor, self.config.healthcheck.clone())
            .check(&self.cancel, &run.state.temp_container_name)
            .await?;
        let healthy = result.healthy;
        let failure = PhaseFailure::Unhealthy {
            attempts: result.attempts,
            message: result.message.clone(),
        };
        run.health = Some(result);
        if healthy { Ok(()) } else { Err(failure) }
    }

    async fn swap_containers(&self, run: &mut Run) -> PhaseResult {
        let production = self.names.production.as_str();
        if run.state.old_container_exists {
            self.checked("stop old container", &commands::stop_container(production))
                .await?;
            self.checked("remove old container", &commands::remove_container(production))
                .await?;
        }
        self.checked(
            "rename new container",
            &commands::rename_container(&run.state.temp_container_name, production),
        )
        .await?;
        run.candidate_renamed = true;
        self.checked(
            "switch current release",
            &commands::symlink(&self.layout.release_dir(&run.release), &self.layout.current_link()),
        )
        .await?;

        if run.mode == Mode::Deploy {
            let marker = ReleaseMarker {
                release: run.release.to_string(),
                image: run.image.clone(),
                deployed_at: Utc::now(),
                previous_release: run.previous_release.clone(),
            };
            let json = serde_json::to_string_pretty(&marker).map_err(|e| {
                PhaseFailure::command("write release marker")(ExecError::Io(e.into()))
            })?;
            self.checked(
                "write release marker",
                &commands::write_file(&self.layout.release_marker(&run.release), &json),
            )
            .await?;
        }
        Ok(())
    }

    async fn post_deploy(&self, run: &mut Run) -> PhaseResult {
        if run.mode == Mode::Deploy {
            let context = self.hook_context(run);
            let runner = HookRunner::new(self.executor);
            for hook in &self.config.hooks.post_deploy {
                match runner
                    .run(&self.cancel, HookPoint::PostDeploy, &self.names.production, hook, &context)
                    .await
                {
                    Ok(result) if result.success => {}
                    Ok(result) => run.diagnostics.warn(Warning::post_deploy(format!(
                        "post-deploy hook `{}` exited with code {}",
                        hook, result.exit_code
                    ))),
                    Err(e) => {
                        let failure = PhaseFailure::from(e);
                        if failure.is_cancelled() {
                            return Err(failure);
                        }
                        run.diagnostics.warn(Warning::post_deploy(format!(
                            "post-deploy hook `{}` failed: {}",
                            hook, failure
                        )));
                    }
                }
            }
        }

        if let Some(worker) = &self.config.worker {
            let name = self.names.worker.as_str();
            // Absent on the first deploy.
            match self
                .executor
                .exec(&self.cancel, &commands::remove_container(name))
                .await
            {
                Ok(_) => {}
                Err(ExecError::Cancelled) => {
                    return Err(PhaseFailure::command("remove worker")(ExecError::Cancelled));
                }
                Err(e) => tracing::debug!(error = %e, "worker removal failed"),
            }
            let spec = self
                .run_spec(name, &run.image, &run.release)
                .command(worker.command.clone());
            self.best_effort(run, WarningKind::PostDeploy, "worker restart failed", &spec.to_command())
                .await?;
        }
        Ok(())
    }

    async fn cleanup(&self, run: &mut Run) -> PhaseResult {
        let listing = match self
            .executor
            .exec_checked(&self.cancel, &commands::list_by_mtime(&self.layout.releases_dir()))
            .await
        {
            Ok(listing) => listing,
            Err(ExecError::Cancelled) => {
                return Err(PhaseFailure::command("list releases")(ExecError::Cancelled));
            }
            Err(e) => {
                run.diagnostics.warn(Warning::cleanup(format!("could not list releases: {}", e)));
                return Ok(());
            }
        };

        let current = run.release.to_string();
        let stale: Vec<String> = listing
            .stdout
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .skip(self.config.keep_releases)
            .filter(|name| *name != current)
            .map(str::to_string)
            .collect();

        for name in stale {
            let Ok(tag) = ReleaseTag::new(&name) else {
                tracing::debug!(entry = %name, "ignoring foreign entry in releases directory");
                continue;
            };
            let remove = commands::remove_tree(&self.layout.release_dir(&tag));
            match self.executor.exec_checked(&self.cancel, &remove).await {
                Ok(_) => run.pruned.push(name),
                Err(ExecError::Cancelled) => {
                    return Err(PhaseFailure::command("prune release")(ExecError::Cancelled));
                }
                Err(e) => run
                    .diagnostics
                    .warn(Warning::cleanup(format!("could not prune release {}: {}", name, e))),
            }
        }
        if !run.pruned.is_empty() {
            tracing::info!(count = run.pruned.len(), "pruned old releases");
        }
        Ok(())
    }
}
