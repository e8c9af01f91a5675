// ABOUTME: Status command implementation.
// ABOUTME: Reports the current release and container states on each server.

use super::connection::{connect, disconnect, emit_warnings, select_servers};
use serde::Serialize;
use skiff::config::Config;
use skiff::deploy::{ContainerNames, Deployer};
use skiff::diagnostics::Diagnostics;
use skiff::error::Result;
use skiff::exec::Executor;
use skiff::output::Output;
use skiff::security::shell_escape;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub server: String,
    pub current_release: Option<String>,
    pub releases: Vec<String>,
    pub containers: Vec<ContainerStatus>,
}

#[derive(Debug, Serialize)]
pub struct ContainerStatus {
    pub name: String,
    /// `docker inspect` state, or "absent".
    pub state: String,
}

fn state_command(container: &str) -> String {
    format!(
        "docker inspect -f '{{{{.State.Status}}}}' {} 2>/dev/null || echo absent",
        shell_escape(container)
    )
}

async fn server_status<E: Executor + ?Sized>(
    executor: &E,
    config: &Config,
    server: &str,
    cancel: &CancellationToken,
) -> Result<ServerStatus> {
    let deployer = Deployer::new(executor, config, server).cancel_token(cancel.clone());
    let (releases, current_release) = deployer.releases().await?;

    let names = ContainerNames::new(&config.app);
    let mut containers = Vec::new();
    for name in [&names.production, &names.worker, &names.database] {
        let state = executor.exec(cancel, &state_command(name)).await?;
        containers.push(ContainerStatus {
            name: name.clone(),
            state: state.stdout.trim().to_string(),
        });
    }

    Ok(ServerStatus {
        server: server.to_string(),
        current_release,
        releases,
        containers,
    })
}

pub async fn status(
    config: Config,
    server_filter: Option<&str>,
    cancel: CancellationToken,
    output: Output,
) -> Result<()> {
    let mut diag = Diagnostics::default();
    let mut statuses = Vec::new();

    for server in select_servers(&config, server_filter)? {
        let executor = connect(&config, server, &output).await?;
        let result = server_status(&executor, &config, &server.host, &cancel).await;
        disconnect(&executor, server, &mut diag).await;
        let status = result?;

        output.progress(&format!("{}:", status.server));
        output.progress(&format!(
            "  current release: {}",
            status.current_release.as_deref().unwrap_or("none")
        ));
        output.progress(&format!("  releases on disk: {}", status.releases.len()));
        for container in &status.containers {
            output.progress(&format!("  {}: {}", container.name, container.state));
        }
        statuses.push(status);
    }

    emit_warnings(&output, &diag);
    output.success_with(&format!("Status of {}", config.app), Some(&statuses));
    Ok(())
}
