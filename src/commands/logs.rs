// ABOUTME: Logs command implementation.
// ABOUTME: Streams `docker logs` of an app container to the local terminal.

use super::connection::{connect, container_for, disconnect, emit_warnings, select_servers};
use crate::cli::Service;
use skiff::config::Config;
use skiff::deploy::ContainerNames;
use skiff::diagnostics::Diagnostics;
use skiff::error::Result;
use skiff::exec::{ExecError, Executor, StreamMode};
use skiff::output::Output;
use skiff::security::{shell_escape, validate_duration, validate_numeric};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsOptions<'a> {
    pub tail: Option<&'a str>,
    pub since: Option<&'a str>,
    pub follow: bool,
}

pub fn logs_command(container: &str, options: &LogsOptions<'_>) -> Result<String> {
    let mut command = String::from("docker logs");
    if let Some(tail) = options.tail {
        validate_numeric(tail)?;
        command.push_str(&format!(" --tail {}", shell_escape(tail)));
    }
    if let Some(since) = options.since {
        validate_duration(since)?;
        command.push_str(&format!(" --since {}", shell_escape(since)));
    }
    if options.follow {
        command.push_str(" --follow");
    }
    command.push(' ');
    command.push_str(&shell_escape(container));
    Ok(command)
}

pub async fn logs(
    config: Config,
    server_filter: Option<&str>,
    service: Service,
    options: LogsOptions<'_>,
    cancel: CancellationToken,
    output: Output,
) -> Result<()> {
    let names = ContainerNames::new(&config.app);
    let command = logs_command(container_for(&names, service), &options)?;
    let server = select_servers(&config, server_filter)?[0];
    let mut diag = Diagnostics::default();

    let executor = connect(&config, server, &output).await?;
    let result = executor.exec_stream(&cancel, &command, StreamMode::Follow).await;
    disconnect(&executor, server, &mut diag).await;
    emit_warnings(&output, &diag);

    match result {
        // Ctrl-C ends a follow.
        Ok(_) | Err(ExecError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
