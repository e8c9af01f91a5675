// ABOUTME: Exec and shell command implementations.
// ABOUTME: Attach the local terminal to a command inside one of the app's containers.

use super::connection::{connect, container_for, disconnect, emit_warnings, select_servers};
use crate::cli::Service;
use skiff::config::Config;
use skiff::deploy::ContainerNames;
use skiff::diagnostics::Diagnostics;
use skiff::error::{Error, Result};
use skiff::exec::{CommandError, ExecError, Executor, StreamMode};
use skiff::output::Output;
use skiff::security::{shell_escape, validate_docker_command, validate_username};
use tokio_util::sync::CancellationToken;

/// `docker exec` invocation for `command` (already validated) in `container`.
pub fn docker_exec_command(
    container: &str,
    user: Option<&str>,
    command: &str,
    interactive: bool,
) -> Result<String> {
    let mut parts = vec!["docker exec".to_string()];
    if interactive {
        parts.push("-it".to_string());
    }
    if let Some(user) = user {
        validate_username(user)?;
        parts.push(format!("-u {}", shell_escape(user)));
    }
    parts.push(shell_escape(container));
    parts.push(format!("sh -c {}", shell_escape(command)));
    Ok(parts.join(" "))
}

async fn run_attached(
    config: &Config,
    server_filter: Option<&str>,
    command: &str,
    mode: StreamMode,
    cancel: &CancellationToken,
    output: &Output,
) -> Result<()> {
    // Commands act on the first selected server only.
    let server = select_servers(config, server_filter)?[0];
    let mut diag = Diagnostics::default();

    let executor = connect(config, server, output).await?;
    let result = executor.exec_stream(cancel, command, mode).await;
    disconnect(&executor, server, &mut diag).await;
    emit_warnings(output, &diag);

    match result {
        Ok(0) | Err(ExecError::Cancelled) => Ok(()),
        Ok(exit_code) => Err(Error::Exec(ExecError::Failed(CommandError {
            exit_code,
            stderr: String::new(),
        }))),
        Err(e) => Err(e.into()),
    }
}

pub async fn exec_command(
    config: Config,
    server_filter: Option<&str>,
    user: Option<&str>,
    service: Service,
    command: &[String],
    cancel: CancellationToken,
    output: Output,
) -> Result<()> {
    let command = command.join(" ");
    validate_docker_command(&command)?;

    let names = ContainerNames::new(&config.app);
    let remote = docker_exec_command(container_for(&names, service), user, &command, false)?;
    run_attached(&config, server_filter, &remote, StreamMode::Follow, &cancel, &output).await
}

pub async fn shell(
    config: Config,
    server_filter: Option<&str>,
    user: Option<&str>,
    service: Service,
    cancel: CancellationToken,
    output: Output,
) -> Result<()> {
    let names = ContainerNames::new(&config.app);
    let remote = docker_exec_command(
        container_for(&names, service),
        user,
        "if command -v bash >/dev/null 2>&1; then exec bash; else exec sh; fi",
        true,
    )?;
    run_attached(&config, server_filter, &remote, StreamMode::Interactive, &cancel, &output).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_quotes_every_value() {
        let command = docker_exec_command("shop", Some("www-data"), "bin/console cache:clear", false)
            .unwrap();
        assert_eq!(
            command,
            "docker exec -u 'www-data' 'shop' sh -c 'bin/console cache:clear'"
        );
    }

    #[test]
    fn shell_requests_tty() {
        let command = docker_exec_command("shop-worker", None, "sh", true).unwrap();
        assert_eq!(command, "docker exec -it 'shop-worker' sh -c 'sh'");
    }

    #[test]
    fn invalid_user_is_rejected() {
        assert!(docker_exec_command("shop", Some("root;id"), "ls", false).is_err());
    }
}
