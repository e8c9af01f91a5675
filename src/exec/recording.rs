// ABOUTME: In-memory Executor that records commands and replays scripted results.
// ABOUTME: Lets deployment flows be exercised without a remote host.

use super::{ExecError, ExecResult, Executor, StreamMode};
use crate::ssh;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Reply {
    Result(ExecResult),
    /// Simulates the connection dropping mid-command.
    Disconnect,
}

#[derive(Debug)]
struct Script {
    pattern: String,
    reply: Reply,
    /// `None` replies forever, `Some(n)` replies n more times.
    remaining: Option<usize>,
}

/// Records every command; replies come from the first script whose pattern
/// is a substring of the command. Unmatched commands succeed with no output.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<String>>,
    scripts: Mutex<Vec<Script>>,
    closed: AtomicBool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, pattern: &str, reply: Reply, remaining: Option<usize>) {
        self.scripts.lock().push(Script {
            pattern: pattern.to_string(),
            reply,
            remaining,
        });
    }

    /// Reply to every matching command with `result`.
    pub fn on(&self, pattern: &str, result: ExecResult) -> &Self {
        self.push(pattern, Reply::Result(result), None);
        self
    }

    /// Reply to the next matching command only.
    pub fn once(&self, pattern: &str, result: ExecResult) -> &Self {
        self.push(pattern, Reply::Result(result), Some(1));
        self
    }

    /// Fail every matching command with a transport error.
    pub fn disconnect_on(&self, pattern: &str) -> &Self {
        self.push(pattern, Reply::Disconnect, None);
        self
    }

    /// All commands received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn commands_containing(&self, needle: &str) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.contains(needle))
            .cloned()
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, command: &str) -> Reply {
        self.commands.lock().push(command.to_string());

        let mut scripts = self.scripts.lock();
        let Some(script) = scripts
            .iter_mut()
            .find(|s| s.remaining != Some(0) && command.contains(&s.pattern))
        else {
            return Reply::Result(ExecResult::default());
        };
        if let Some(remaining) = script.remaining.as_mut() {
            *remaining -= 1;
        }
        script.reply.clone()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn exec(
        &self,
        cancel: &CancellationToken,
        command: &str,
    ) -> Result<ExecResult, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        match self.record(command) {
            Reply::Result(result) => Ok(result),
            Reply::Disconnect => Err(ssh::Error::ChannelClosed.into()),
        }
    }

    async fn exec_stream(
        &self,
        cancel: &CancellationToken,
        command: &str,
        _mode: StreamMode,
    ) -> Result<u32, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        match self.record(command) {
            Reply::Result(result) => Ok(result.exit_code),
            Reply::Disconnect => Err(ssh::Error::ChannelClosed.into()),
        }
    }

    async fn close(&self) -> Result<(), ExecError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
