// ABOUTME: Polls a container until its HTTP endpoint answers with a 2xx status.
// ABOUTME: Probes run inside the container through docker exec, curl first, then wget.

use crate::config::HealthcheckConfig;
use crate::exec::{ExecError, Executor};
use crate::security::shell_escape;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Outcome of a health check. An unhealthy container is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResult {
    pub healthy: bool,
    pub status_code: Option<u16>,
    pub message: String,
    /// Duration of the successful probe, or of the whole check on failure.
    pub response_time: Duration,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("health check cancelled")]
    Cancelled,

    #[error("container {container} not running after {waited:?}")]
    NotRunning { container: String, waited: Duration },
}

#[derive(Debug)]
enum ProbeFailure {
    NotRunning,
    Status(u16),
    NoResponse(String),
    Exec(ExecError),
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::NotRunning => write!(f, "container is not running"),
            ProbeFailure::Status(code) => write!(f, "endpoint returned HTTP {}", code),
            ProbeFailure::NoResponse(detail) if detail.is_empty() => {
                write!(f, "endpoint did not respond")
            }
            ProbeFailure::NoResponse(detail) => write!(f, "endpoint did not respond: {}", detail),
            ProbeFailure::Exec(e) => write!(f, "probe failed: {}", e),
        }
    }
}

/// `docker inspect` command reporting whether a container is running.
pub fn running_state_command(container: &str) -> String {
    format!(
        "docker inspect -f '{{{{.State.Running}}}}' {} 2>/dev/null",
        shell_escape(container)
    )
}

/// In-container HTTP probe printing the status code on its last line.
pub fn http_probe_command(container: &str, port: u16, path: &str) -> String {
    let url = shell_escape(&format!("http://127.0.0.1:{}{}", port, path));
    let script = format!(
        "curl -s -o /dev/null -w '%{{http_code}}\\n' --max-time 5 {url} 2>/dev/null \
         || wget -q -S -O /dev/null -T 5 {url} 2>&1 | awk '/HTTP\\//{{print $2}}' | tail -n 1"
    );
    format!("docker exec {} sh -c {}", shell_escape(container), shell_escape(&script))
}

fn parse_status(stdout: &str) -> Option<u16> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .and_then(|line| line.parse::<u16>().ok())
        .filter(|code| *code > 0)
}

pub struct HealthChecker<'a, E: Executor + ?Sized> {
    executor: &'a E,
    config: HealthcheckConfig,
}

impl<'a, E: Executor + ?Sized> HealthChecker<'a, E> {
    pub fn new(executor: &'a E, config: HealthcheckConfig) -> Self {
        Self { executor, config }
    }

    /// Probe `container` up to `retries` times within `timeout`.
    pub async fn check(
        &self,
        cancel: &CancellationToken,
        container: &str,
    ) -> Result<HealthResult, HealthError> {
        let start = Instant::now();
        let mut attempts = 0;
        let mut last_status = None;
        let mut message = String::from("no probe attempted");

        for attempt in 1..=self.config.retries {
            if start.elapsed() >= self.config.timeout {
                message = format!("timed out after {:?}: {}", self.config.timeout, message);
                break;
            }
            attempts = attempt;

            let probe_start = Instant::now();
            match self.probe(cancel, container).await {
                Ok(code) => {
                    tracing::info!(container, attempt, status = code, "health check passed");
                    return Ok(HealthResult {
                        healthy: true,
                        status_code: Some(code),
                        message: format!("HTTP {}", code),
                        response_time: probe_start.elapsed(),
                        attempts,
                    });
                }
                Err(ProbeFailure::Exec(ExecError::Cancelled)) => return Err(HealthError::Cancelled),
                Err(failure) => {
                    if let ProbeFailure::Status(code) = failure {
                        last_status = Some(code);
                    }
                    tracing::debug!(
                        container,
                        attempt,
                        retries = self.config.retries,
                        "health probe failed: {}",
                        failure
                    );
                    message = failure.to_string();
                }
            }

            if attempt < self.config.retries {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.interval) => {}
                    _ = cancel.cancelled() => return Err(HealthError::Cancelled),
                }
            }
        }

        Ok(HealthResult {
            healthy: false,
            status_code: last_status,
            message,
            response_time: start.elapsed(),
            attempts,
        })
    }

    async fn probe(&self, cancel: &CancellationToken, container: &str) -> Result<u16, ProbeFailure> {
        let state = self
            .executor
            .exec(cancel, &running_state_command(container))
            .await
            .map_err(ProbeFailure::Exec)?;
        if !state.success() || state.stdout.trim() != "true" {
            return Err(ProbeFailure::NotRunning);
        }

        let command = http_probe_command(container, self.config.port, &self.config.path);
        let output = self
            .executor
            .exec(cancel, &command)
            .await
            .map_err(ProbeFailure::Exec)?;

        match parse_status(&output.stdout) {
            Some(code) if (200..300).contains(&code) => Ok(code),
            Some(code) => Err(ProbeFailure::Status(code)),
            None => Err(ProbeFailure::NoResponse(output.stderr.trim().to_string())),
        }
    }

    /// Poll only the run-state until the container is running.
    pub async fn wait_for_container(
        &self,
        cancel: &CancellationToken,
        container: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), HealthError> {
        let start = Instant::now();
        loop {
            match self
                .executor
                .exec(cancel, &running_state_command(container))
                .await
            {
                Ok(state) if state.success() && state.stdout.trim() == "true" => return Ok(()),
                Ok(_) => {}
                Err(ExecError::Cancelled) => return Err(HealthError::Cancelled),
                Err(e) => tracing::debug!(container, error = %e, "run-state probe failed"),
            }

            if start.elapsed() + interval > timeout {
                return Err(HealthError::NotRunning {
                    container: container.to_string(),
                    waited: start.elapsed(),
                });
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return Err(HealthError::Cancelled),
            }
        }
    }
}
