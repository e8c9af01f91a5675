// ABOUTME: Executor backed by a managed SSH connection.
// ABOUTME: One session channel per command; stdout and stderr are captured separately.

use super::{ExecError, ExecResult, Executor, StreamMode};
use crate::security::sanitize_command_for_log;
use crate::ssh::{self, Connection};
use async_trait::async_trait;
use russh::ChannelMsg;
use russh::client::Msg;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Default bound on a single captured command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Exit code reported when the remote process was killed by a signal.
const SIGNAL_EXIT_CODE: u32 = 255;

pub struct RemoteExecutor {
    connection: Connection,
    command_timeout: Duration,
}

impl RemoteExecutor {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("target", &self.connection.target().to_string())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

async fn collect_output(channel: &mut russh::Channel<Msg>) -> Result<ExecResult, ExecError> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;
    let mut got_eof = false;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                exit_code = Some(exit_status);
                if got_eof {
                    break;
                }
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                tracing::debug!(signal = ?signal_name, "remote process killed by signal");
                exit_code = Some(SIGNAL_EXIT_CODE);
                if got_eof {
                    break;
                }
            }
            Some(ChannelMsg::Eof) => {
                got_eof = true;
                if exit_code.is_some() {
                    break;
                }
            }
            Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    // No exit status means the transport dropped mid-command.
    let exit_code = exit_code.ok_or(ssh::Error::ChannelClosed)?;

    Ok(ExecResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}

impl RemoteExecutor {
    /// Stream a command over the given local endpoints.
    ///
    /// `stdin` is forwarded only in [`StreamMode::Interactive`], which also
    /// requests a PTY. Returns the remote exit code.
    pub async fn exec_piped<I, O, E>(
        &self,
        cancel: &CancellationToken,
        command: &str,
        mode: StreamMode,
        mut stdin: I,
        mut stdout: O,
        mut stderr: E,
    ) -> Result<u32, ExecError>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        tracing::debug!(command = %sanitize_command_for_log(command), ?mode, "exec stream");

        let mut channel = self.connection.open_channel().await?;
        if mode == StreamMode::Interactive {
            let term = std::env::var("TERM").unwrap_or_else(|_| "xterm".to_string());
            channel.request_pty(false, &term, 80, 24, 0, 0, &[]).await?;
        }
        channel.exec(true, command).await?;

        let mut buf = vec![0u8; 4096];
        let mut stdin_open = mode == StreamMode::Interactive;
        let mut exit_code = None;

        loop {
            tokio::select! {
                read = stdin.read(&mut buf), if stdin_open => match read? {
                    0 => {
                        stdin_open = false;
                        channel.eof().await?;
                    }
                    n => channel.data(&buf[..n]).await?,
                },
                msg = channel.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        stderr.write_all(&data).await?;
                        stderr.flush().await?;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => exit_code = Some(exit_status),
                    Some(ChannelMsg::ExitSignal { .. }) => exit_code = Some(SIGNAL_EXIT_CODE),
                    Some(ChannelMsg::Eof) if exit_code.is_some() => break,
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                },
                _ = cancel.cancelled() => {
                    tracing::debug!("stream cancelled, closing channel");
                    channel.close().await?;
                    return Err(ExecError::Cancelled);
                }
            }
        }

        Ok(exit_code.ok_or(ssh::Error::ChannelClosed)?)
    }
}

#[async_trait]
impl Executor for RemoteExecutor {
    async fn exec(
        &self,
        cancel: &CancellationToken,
        command: &str,
    ) -> Result<ExecResult, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        tracing::debug!(command = %sanitize_command_for_log(command), "exec");

        let mut channel = self.connection.open_channel().await?;
        channel.exec(true, command).await?;

        let result = match tokio::time::timeout(self.command_timeout, collect_output(&mut channel))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(ssh::Error::CommandTimeout(self.command_timeout).into()),
        };

        tracing::debug!(exit_code = result.exit_code, "command finished");
        Ok(result)
    }

    async fn exec_stream(
        &self,
        cancel: &CancellationToken,
        command: &str,
        mode: StreamMode,
    ) -> Result<u32, ExecError> {
        self.exec_piped(
            cancel,
            command,
            mode,
            tokio::io::stdin(),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
        .await
    }

    async fn close(&self) -> Result<(), ExecError> {
        self.connection.close().await?;
        Ok(())
    }
}
