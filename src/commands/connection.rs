// ABOUTME: Shared helpers for reaching servers from the CLI commands.
// ABOUTME: Loads config, selects servers, connects and disconnects executors.

use crate::cli::Service;
use skiff::config::{Config, ServerConfig};
use skiff::deploy::ContainerNames;
use skiff::diagnostics::{Diagnostics, Warning};
use skiff::error::{Error, Result};
use skiff::exec::{Executor, RemoteExecutor};
use skiff::output::Output;
use skiff::ssh::Connection;
use std::env;
use std::path::Path;

/// Load the explicit config file, or discover one in the working directory.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

/// Every configured server, or only the one whose host is `only`.
pub fn select_servers<'a>(config: &'a Config, only: Option<&str>) -> Result<Vec<&'a ServerConfig>> {
    match only {
        None => Ok(config.servers.iter().collect()),
        Some(host) => config
            .servers
            .iter()
            .find(|server| server.host == host)
            .map(|server| vec![server])
            .ok_or_else(|| Error::UnknownServer(host.to_string())),
    }
}

pub fn container_for(names: &ContainerNames, service: Service) -> &str {
    match service {
        Service::App => &names.production,
        Service::Worker => &names.worker,
        Service::Db => &names.database,
    }
}

pub async fn connect(config: &Config, server: &ServerConfig, output: &Output) -> Result<RemoteExecutor> {
    output.progress(&format!("  → Connecting to {}...", server.host));
    let connection = Connection::new(server.target(), config.ssh.connect_options());
    connection.connect().await?;
    Ok(RemoteExecutor::new(connection).command_timeout(config.ssh.command_timeout))
}

/// Disconnect; a failure here is only worth a warning.
pub async fn disconnect(executor: &RemoteExecutor, server: &ServerConfig, diag: &mut Diagnostics) {
    if let Err(e) = executor.close().await {
        diag.warn(Warning::ssh_disconnect(format!(
            "SSH disconnect failed for {}: {}",
            server.host, e
        )));
    }
}

pub fn emit_warnings(output: &Output, diag: &Diagnostics) {
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
}
