// ABOUTME: SSH-specific error types.
// ABOUTME: Covers dialing, authentication, key loading and host key verification failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to connect to {host}:{port} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("authentication failed for user {0}")]
    AuthenticationFailed(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error(
        "no SSH private key found: set key_path, SKIFF_SSH_PRIVATE_KEY, or create ~/.ssh/id_ed25519"
    )]
    KeyNotFound,

    #[error("host key for {host}:{port} rejected: {reason}")]
    HostKeyRejected {
        host: String,
        port: u16,
        reason: String,
    },

    #[error(
        "cannot verify host keys: no known_hosts file, no SKIFF_KNOWN_HOSTS content and \
         SKIFF_INSECURE_SKIP_HOST_KEY_CHECK is not set"
    )]
    HostKeyUnverifiable,

    #[error("not connected: connect() has not succeeded yet")]
    NotConnected,

    #[error("failed to open session channel: {0}")]
    ChannelOpen(#[source] russh::Error),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether dialing again can plausibly succeed.
    ///
    /// Trust and credential failures are final: the same key and the same
    /// host key will be presented on the next attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::HostKeyRejected { .. }
                | Error::HostKeyUnverifiable
                | Error::AuthenticationFailed(_)
                | Error::KeyLoadFailed { .. }
                | Error::KeyNotFound
                | Error::NotConnected
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
